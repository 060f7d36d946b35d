use account_service::core::config::Config;
use account_service::core::{routes, startup, tracing_init};
use anyhow::{bail, Context, Result};
use axum::serve;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, UnixListener};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let config_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("config.toml")
    };

    // File is optional; PORT and STORAGE_URI override it
    let config = Config::load(&config_path).context(format!(
        "Failed to load configuration from '{}'",
        config_path.display()
    ))?;

    tracing_init::init_tracing(&config.logging)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.num_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, config_path))
}

async fn async_main(config: Config, config_path: PathBuf) -> Result<()> {
    info!(
        config_path = %config_path.display(),
        port = ?config.server.port,
        unix_socket = ?config.server.unix_socket,
        num_threads = config.server.num_threads,
        storage = %config.storage.uri,
        log_level = %config.logging.level,
        log_format = %config.logging.format,
        "Account service starting"
    );

    // Fail fast: no store, no service
    let state = Arc::new(startup::build_state(&config)?);

    let app = routes::build_router(Arc::clone(&state)).layer(
        ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        ),
    );

    let tcp_handle = if let Some(port) = config.server.port {
        let addr = format!("0.0.0.0:{}", port);
        info!(address = %addr, "Starting TCP listener");

        let listener = TcpListener::bind(&addr)
            .await
            .context(format!("Failed to bind TCP listener to {}", addr))?;

        info!(address = %addr, "TCP listener bound successfully");

        let app_clone = app.clone();
        Some(tokio::spawn(async move {
            serve(listener, app_clone.into_make_service())
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("TCP server error")
        }))
    } else {
        None
    };

    let unix_handle = if let Some(unix_socket) = &config.server.unix_socket {
        info!(path = %unix_socket.display(), "Starting Unix socket listener");

        if unix_socket.exists() {
            std::fs::remove_file(unix_socket).context(format!(
                "Failed to remove existing Unix socket: {}",
                unix_socket.display()
            ))?;
        }

        let listener = UnixListener::bind(unix_socket).context(format!(
            "Failed to bind Unix socket listener to {}",
            unix_socket.display()
        ))?;

        info!(path = %unix_socket.display(), "Unix socket listener bound successfully");

        let mut make_service = app.into_make_service();
        Some(tokio::spawn(async move {
            use tower::Service;

            let shutdown = shutdown_signal();
            tokio::pin!(shutdown);

            loop {
                let (socket, _remote_addr) = tokio::select! {
                    _ = &mut shutdown => break,
                    accepted = listener.accept() => match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!(error = %e, "Failed to accept Unix socket connection");
                            continue;
                        }
                    },
                };

                let tower_service = match make_service.call(&socket).await {
                    Ok(svc) => svc,
                    Err(infallible) => match infallible {},
                };

                tokio::spawn(async move {
                    let socket = hyper_util::rt::TokioIo::new(socket);

                    let hyper_service = hyper::service::service_fn(
                        move |request: hyper::Request<hyper::body::Incoming>| {
                            tower_service.clone().call(request)
                        },
                    );

                    if let Err(err) = hyper_util::server::conn::auto::Builder::new(
                        hyper_util::rt::TokioExecutor::new(),
                    )
                    .serve_connection_with_upgrades(socket, hyper_service)
                    .await
                    {
                        error!(error = %err, "Error serving Unix socket connection");
                    }
                });
            }

            Ok::<(), anyhow::Error>(())
        }))
    } else {
        None
    };

    info!(users = state.store.len(), "Account service started, waiting for shutdown signal");

    let result: Result<()> = match (tcp_handle, unix_handle) {
        (Some(tcp), Some(unix)) => {
            tokio::select! {
                result = tcp => result.context("TCP server task panicked")?,
                result = unix => result.context("Unix socket server task panicked")?,
            }
        }
        (Some(tcp), None) => tcp.await.context("TCP server task panicked")?,
        (None, Some(unix)) => unix.await.context("Unix socket server task panicked")?,
        (None, None) => {
            error!("No listeners configured");
            bail!("No listeners configured");
        }
    };

    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "Server stopped with an error");
    }

    info!("Shutting down gracefully");
    state
        .store
        .shutdown()
        .context("Failed to sync user store on shutdown")?;

    if let Some(unix_socket) = &config.server.unix_socket {
        let _ = std::fs::remove_file(unix_socket);
    }

    result
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
