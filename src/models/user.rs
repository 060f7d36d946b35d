/// A registered account as held by the user store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    /// Unique, immutable login name
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
    /// Token of the active session, if any
    pub session_token: Option<String>,
    /// Epoch millis of the last login
    pub session_timestamp: Option<i64>,
    /// Epoch millis at which the subscription lapses
    pub subscription_end: Option<i64>,
    /// Plan length of the last accepted code
    pub subscription_months: Option<u32>,
}

impl User {
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            username,
            password_hash,
            session_token: None,
            session_timestamp: None,
            subscription_end: None,
            subscription_months: None,
        }
    }

    /// A subscription is active only while its end lies strictly in the future
    pub fn is_subscribed(&self, now_millis: i64) -> bool {
        self.subscription_end.is_some_and(|end| end > now_millis)
    }
}
