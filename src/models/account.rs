use serde::{Deserialize, Serialize};

// Request bodies keep every field optional so that a missing field is
// reported by our own validation rather than a generic JSON rejection.

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateSessionRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCodeRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub subscription_months: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub username: String,
    pub session_token: String,
    pub subscription_end: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidSessionResponse {
    pub valid: bool,
    pub is_subscribed: bool,
    pub subscription_end: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidSessionResponse {
    pub valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub message: String,
    pub subscription_end: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
