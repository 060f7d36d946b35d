use crate::core::error::AccountError;
use crate::core::state::AppState;
use crate::models::account::{SubmitCodeRequest, SubscriptionResponse};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

/// Redeem an access code for a subscription
///
/// POST /api/submit-code {username, code, subscriptionMonths}
pub async fn submit_code_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitCodeRequest>, JsonRejection>,
) -> Result<Response, AccountError> {
    let Json(body) = payload?;

    let months = body.subscription_months.ok_or_else(|| {
        AccountError::validation("Username, code and subscriptionMonths are required")
    })?;

    let subscription_end = state.accounts.submit_code(
        body.username.as_deref().unwrap_or_default(),
        body.code.as_deref().unwrap_or_default(),
        months,
    )?;

    Ok((
        StatusCode::OK,
        Json(SubscriptionResponse {
            message: format!("Subscription activated for {} months", months),
            subscription_end,
        }),
    )
        .into_response())
}
