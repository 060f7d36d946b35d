use crate::core::error::AccountError;
use crate::core::state::AppState;
use crate::models::account::{
    CredentialsRequest, InvalidSessionResponse, LoginResponse, LogoutRequest, MessageResponse,
    ValidSessionResponse, ValidateSessionRequest,
};
use crate::services::account::SessionStatus;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

/// Register a new user
///
/// POST /api/register {username, password}
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response, AccountError> {
    let Json(body) = payload?;

    state
        .accounts
        .register(
            body.username.as_deref().unwrap_or_default(),
            body.password.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Registration successful".to_string(),
        }),
    )
        .into_response())
}

/// Log in and receive a session token
///
/// POST /api/login {username, password}
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response, AccountError> {
    let Json(body) = payload?;

    let outcome = state
        .accounts
        .login(
            body.username.as_deref().unwrap_or_default(),
            body.password.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            message: "Login successful".to_string(),
            username: outcome.username,
            session_token: outcome.session_token,
            subscription_end: outcome.subscription_end,
        }),
    )
        .into_response())
}

/// Check whether a session token is still the active one
///
/// POST /api/validate-session {username, sessionToken}
///
/// Never fails with `{error}`: anything short of a match is `401 {valid:false}`.
pub async fn validate_session_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ValidateSessionRequest>, JsonRejection>,
) -> Response {
    let status = match payload {
        Ok(Json(body)) => state.accounts.validate_session(
            body.username.as_deref().unwrap_or_default(),
            body.session_token.as_deref().unwrap_or_default(),
        ),
        Err(_) => SessionStatus::Invalid,
    };

    match status {
        SessionStatus::Valid {
            is_subscribed,
            subscription_end,
        } => (
            StatusCode::OK,
            Json(ValidSessionResponse {
                valid: true,
                is_subscribed,
                subscription_end,
            }),
        )
            .into_response(),
        SessionStatus::Invalid => (
            StatusCode::UNAUTHORIZED,
            Json(InvalidSessionResponse { valid: false }),
        )
            .into_response(),
    }
}

/// End the user's session
///
/// POST /api/logout {username}
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LogoutRequest>, JsonRejection>,
) -> Result<Response, AccountError> {
    let Json(body) = payload?;

    state
        .accounts
        .logout(body.username.as_deref().unwrap_or_default())?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Logout successful".to_string(),
        }),
    )
        .into_response())
}
