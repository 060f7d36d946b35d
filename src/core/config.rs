use crate::stores::user_store::StorageUri;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub codes: CodesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: Option<u16>,
    pub unix_socket: Option<PathBuf>,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// `memory:`, `file:<path>` or a bare path
    #[serde(default = "default_storage_uri")]
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CodesConfig {
    /// Replacement access code table; the built-in one is used when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
}

// Default value functions
fn default_port() -> Option<u16> {
    Some(3000)
}

fn default_num_threads() -> usize {
    num_cpus::get()
}

fn default_storage_uri() -> String {
    "file:accounts.wal".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_console() -> bool {
    false
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            unix_socket: None,
            num_threads: default_num_threads(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uri: default_storage_uri(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            console: default_console(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise start from defaults, then apply
    /// `PORT` and `STORAGE_URI` from the environment
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };

        config.apply_overrides(
            std::env::var("PORT").ok().as_deref(),
            std::env::var("STORAGE_URI").ok().as_deref(),
        )?;

        config.validate()?;

        Ok(config)
    }

    pub fn apply_overrides(&mut self, port: Option<&str>, storage_uri: Option<&str>) -> Result<()> {
        if let Some(port) = port {
            let port = port
                .trim()
                .parse::<u16>()
                .context(format!("Invalid PORT value '{}'", port))?;
            self.server.port = Some(port);
        }

        if let Some(uri) = storage_uri {
            self.storage.uri = uri.to_string();
        }

        Ok(())
    }

    pub fn storage_uri(&self) -> Result<StorageUri> {
        StorageUri::parse(&self.storage.uri)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port.is_none() && self.server.unix_socket.is_none() {
            bail!("Either port or unix_socket must be specified in server config");
        }

        if let Some(port) = self.server.port {
            if port == 0 {
                bail!("Server port must be greater than 0");
            }
        }

        if self.server.num_threads == 0 {
            bail!("num_threads must be greater than 0");
        }

        self.storage_uri().context("Invalid storage uri")?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }
}
