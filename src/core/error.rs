// Centralized error handling for the account API

use crate::models::account::ErrorResponse;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracing::error;

/// Errors surfaced by account operations
///
/// Every variant renders as `{"error": "<message>"}`.
#[derive(Error, Debug)]
pub enum AccountError {
    /// Malformed or rule-breaking input
    #[error("{0}")]
    Validation(String),

    /// Username already taken
    #[error("{0}")]
    Conflict(String),

    /// Unknown user or wrong password. Deliberately indistinguishable
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Storage or other unexpected failure. Only `context` reaches the client
    #[error("{context}")]
    Internal {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AccountError {
    pub fn validation(message: impl Into<String>) -> Self {
        AccountError::Validation(message.into())
    }

    pub fn internal(context: &'static str, source: impl Into<anyhow::Error>) -> Self {
        AccountError::Internal {
            context,
            source: source.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AccountError::Validation(_) => StatusCode::BAD_REQUEST,
            AccountError::Conflict(_) => StatusCode::BAD_REQUEST,
            AccountError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AccountError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AccountError {
    fn from(rejection: JsonRejection) -> Self {
        AccountError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        if let AccountError::Internal { context, source } = &self {
            error!(error = %format!("{:#}", source), "{}", context);
        }

        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
