//! Account operations: registration, login, session checks, logout and
//! access code redemption.
//!
//! Each public operation reads the clock once and delegates to an `*_at`
//! variant that takes `now` in epoch milliseconds, so expiry arithmetic can
//! be pinned in tests.

use crate::codes::table::{CodeKind, CodeTable, Plan};
use crate::core::error::AccountError;
use crate::models::user::User;
use crate::stores::user_store::{StoreError, UserStore};
use crate::utils::auth::secrets_match;
use crate::utils::password::{hash_password, verify_password};
use crate::utils::time::{add_months, current_timestamp_millis};
use crate::utils::token::generate_session_token;
use crate::validation::account::{
    code_letter, validate_registration, INVALID_FIRST_LETTER, MISSING_CREDENTIALS,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const REGISTRATION_FAILED: &str = "Registration failed";
const LOGIN_FAILED: &str = "Login failed";
const LOGOUT_FAILED: &str = "Logout failed";
const SUBMIT_CODE_FAILED: &str = "Failed to process code";

/// Result of a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub username: String,
    pub session_token: String,
    pub subscription_end: Option<i64>,
}

/// Result of a session check. An invalid session is an answer, not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Invalid,
    Valid {
        is_subscribed: bool,
        subscription_end: Option<i64>,
    },
}

pub struct AccountService {
    store: Arc<UserStore>,
    codes: Arc<CodeTable>,
}

impl AccountService {
    pub fn new(store: Arc<UserStore>, codes: Arc<CodeTable>) -> Self {
        Self { store, codes }
    }

    pub fn store(&self) -> &UserStore {
        &self.store
    }

    /// Create an account with a hashed password
    pub async fn register(&self, username: &str, password: &str) -> Result<(), AccountError> {
        validate_registration(username, password).map_err(AccountError::validation)?;

        if self.store.find(username).is_some() {
            return Err(AccountError::Conflict("Username already registered".to_string()));
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AccountError::internal(REGISTRATION_FAILED, e))?
            .map_err(|e| AccountError::internal(REGISTRATION_FAILED, e))?;

        // The lookup above is only a fast path; insert is the authoritative check
        match self.store.insert(User::new(username.to_string(), password_hash)) {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                return Err(AccountError::Conflict("Username already registered".to_string()));
            }
            Err(e) => return Err(AccountError::internal(REGISTRATION_FAILED, e)),
        }

        info!(username = %username, "User registered");
        Ok(())
    }

    /// Verify credentials and start a new session, replacing any previous one
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome, AccountError> {
        self.login_at(username, password, current_timestamp_millis()).await
    }

    pub async fn login_at(
        &self,
        username: &str,
        password: &str,
        now: i64,
    ) -> Result<LoginOutcome, AccountError> {
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::validation(MISSING_CREDENTIALS));
        }

        let Some(user) = self.store.find(username) else {
            debug!(username = %username, "Login for unknown user");
            return Err(AccountError::InvalidCredentials);
        };

        let password = password.to_string();
        let stored_hash = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
            .await
            .map_err(|e| AccountError::internal(LOGIN_FAILED, e))?
            .map_err(|e| AccountError::internal(LOGIN_FAILED, e))?;

        if !verified {
            warn!(username = %username, "Login with wrong password");
            return Err(AccountError::InvalidCredentials);
        }

        let session_token =
            generate_session_token().map_err(|e| AccountError::internal(LOGIN_FAILED, e))?;

        let updated = self
            .store
            .set_session(username, &session_token, now)
            .map_err(|e| AccountError::internal(LOGIN_FAILED, e))?;

        if !updated {
            return Err(AccountError::InvalidCredentials);
        }

        info!(username = %username, "User logged in");

        Ok(LoginOutcome {
            username: user.username,
            session_token,
            subscription_end: user.subscription_end,
        })
    }

    /// Check a presented token against the stored one
    pub fn validate_session(&self, username: &str, session_token: &str) -> SessionStatus {
        self.validate_session_at(username, session_token, current_timestamp_millis())
    }

    pub fn validate_session_at(
        &self,
        username: &str,
        session_token: &str,
        now: i64,
    ) -> SessionStatus {
        if username.is_empty() || session_token.is_empty() {
            return SessionStatus::Invalid;
        }

        let Some(user) = self.store.find(username) else {
            return SessionStatus::Invalid;
        };

        match &user.session_token {
            Some(stored) if secrets_match(session_token, stored) => SessionStatus::Valid {
                is_subscribed: user.is_subscribed(now),
                subscription_end: user.subscription_end,
            },
            _ => SessionStatus::Invalid,
        }
    }

    /// End the user's session. Succeeds even if there was none, or no
    /// username was given
    pub fn logout(&self, username: &str) -> Result<(), AccountError> {
        if username.is_empty() {
            debug!("Logout without a username");
            return Ok(());
        }

        self.store
            .clear_session(username)
            .map_err(|e| AccountError::internal(LOGOUT_FAILED, e))?;

        info!(username = %username, "User logged out");
        Ok(())
    }

    /// Redeem an access code, returning the new subscription end
    pub fn submit_code(
        &self,
        username: &str,
        code: &str,
        months: u32,
    ) -> Result<i64, AccountError> {
        self.submit_code_at(username, code, months, current_timestamp_millis())
    }

    /// Two concurrent calls for the same user both read the old end date and
    /// the last write wins; nothing serializes them.
    pub fn submit_code_at(
        &self,
        username: &str,
        code: &str,
        months: u32,
        now: i64,
    ) -> Result<i64, AccountError> {
        if username.is_empty() || code.is_empty() {
            return Err(AccountError::validation(
                "Username, code and subscriptionMonths are required",
            ));
        }

        if months == 0 {
            return Err(AccountError::validation(
                "subscriptionMonths must be greater than 0",
            ));
        }

        let letter =
            code_letter(username).ok_or_else(|| AccountError::validation(INVALID_FIRST_LETTER))?;

        let user = self
            .store
            .find(username)
            .ok_or_else(|| AccountError::validation("User not found"))?;

        let renewal = user.is_subscribed(now);
        let kind = if renewal {
            CodeKind::Renewal
        } else {
            CodeKind::Initial
        };

        let expected = self
            .codes
            .expected_code(letter, Plan::for_months(months), kind)
            .ok_or_else(|| AccountError::validation(INVALID_FIRST_LETTER))?;

        if code != expected {
            warn!(username = %username, months = months, renewal = renewal, "Access code rejected");
            return Err(AccountError::validation(format!(
                "Invalid access code for {}-month plan",
                months
            )));
        }

        let subscription_end = add_months(now, months).ok_or_else(|| {
            AccountError::validation(format!("subscriptionMonths {} is out of range", months))
        })?;

        let updated = self
            .store
            .set_subscription(username, subscription_end, months)
            .map_err(|e| AccountError::internal(SUBMIT_CODE_FAILED, e))?;

        if !updated {
            return Err(AccountError::validation("User not found"));
        }

        info!(
            username = %username,
            months = months,
            subscription_end = subscription_end,
            renewal = renewal,
            "Subscription activated"
        );

        Ok(subscription_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::MONTH_MILLIS;
    use crate::validation::account::PASSWORD_TOO_SHORT;
    use axum::http::StatusCode;

    const NOW: i64 = 1_750_000_000_000;
    const DAY: i64 = 24 * 60 * 60 * 1000;

    fn service() -> AccountService {
        AccountService::new(
            Arc::new(UserStore::in_memory()),
            Arc::new(CodeTable::builtin().unwrap()),
        )
    }

    /// Insert a user directly, skipping the password hash
    fn seed(service: &AccountService, username: &str) {
        service
            .store()
            .insert(User::new(username.to_string(), "unused".to_string()))
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let service = service();
        service.register("alice", "secret1").await.unwrap();

        let stored = service.store().find("alice").unwrap();
        assert_ne!(stored.password_hash, "secret1");
        assert!(stored.session_token.is_none());
        assert!(stored.subscription_end.is_none());

        let outcome = service.login("alice", "secret1").await.unwrap();
        assert_eq!(outcome.username, "alice");
        assert_eq!(outcome.session_token.len(), 64);
        assert!(outcome.subscription_end.is_none());

        let stored = service.store().find("alice").unwrap();
        assert_eq!(stored.session_token.as_deref(), Some(outcome.session_token.as_str()));
        assert!(stored.session_timestamp.is_some());
    }

    #[tokio::test]
    async fn test_register_twice_conflicts() {
        let service = service();
        service.register("alice", "secret1").await.unwrap();

        let err = service.register("alice", "another1").await.unwrap_err();
        assert!(matches!(
            err,
            AccountError::Conflict(ref msg) if msg == "Username already registered"
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_usernames() {
        let service = service();

        for username in ["1abc", "ab-c", "-abc", "_abc"] {
            let err = service.register(username, "secret1").await.unwrap_err();
            assert!(
                matches!(
                    err,
                    AccountError::Validation(ref msg)
                        if msg.starts_with("Username must start with a letter")
                ),
                "{} was accepted",
                username
            );
        }
        assert!(service.store().is_empty());
    }

    #[tokio::test]
    async fn test_register_password_length() {
        let service = service();

        let err = service.register("alice", "12345").await.unwrap_err();
        assert!(matches!(
            err,
            AccountError::Validation(ref msg) if msg == PASSWORD_TOO_SHORT
        ));

        service.register("alice", "123456").await.unwrap();
    }

    #[tokio::test]
    async fn test_register_missing_fields() {
        let service = service();
        let err = service.register("", "").await.unwrap_err();
        assert!(matches!(
            err,
            AccountError::Validation(ref msg) if msg == "Username and password are required"
        ));
    }

    #[tokio::test]
    async fn test_login_wrong_password_matches_unknown_user() {
        let service = service();
        service.register("alice", "secret1").await.unwrap();

        let wrong = service.login("alice", "secret2").await.unwrap_err();
        let unknown = service.login("mallory", "secret1").await.unwrap_err();

        assert!(matches!(wrong, AccountError::InvalidCredentials));
        assert!(matches!(unknown, AccountError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());

        assert!(service.store().find("alice").unwrap().session_token.is_none());
    }

    #[tokio::test]
    async fn test_second_login_replaces_session() {
        let service = service();
        service.register("alice", "secret1").await.unwrap();

        let first = service.login("alice", "secret1").await.unwrap();
        let second = service.login("alice", "secret1").await.unwrap();
        assert_ne!(first.session_token, second.session_token);

        assert_eq!(service.validate_session("alice", &first.session_token), SessionStatus::Invalid);
        assert!(matches!(
            service.validate_session("alice", &second.session_token),
            SessionStatus::Valid { .. }
        ));
    }

    #[tokio::test]
    async fn test_login_reports_subscription_end() {
        let service = service();
        service.register("alice", "secret1").await.unwrap();
        service.store().set_subscription("alice", NOW, 3).unwrap();

        let outcome = service.login("alice", "secret1").await.unwrap();
        assert_eq!(outcome.subscription_end, Some(NOW));
    }

    #[test]
    fn test_validate_session() {
        let service = service();
        seed(&service, "alice");
        service.store().set_session("alice", "tok", NOW).unwrap();

        assert_eq!(
            service.validate_session_at("alice", "tok", NOW),
            SessionStatus::Valid {
                is_subscribed: false,
                subscription_end: None
            }
        );

        service.store().set_subscription("alice", NOW + DAY, 3).unwrap();
        assert_eq!(
            service.validate_session_at("alice", "tok", NOW),
            SessionStatus::Valid {
                is_subscribed: true,
                subscription_end: Some(NOW + DAY)
            }
        );
        assert_eq!(
            service.validate_session_at("alice", "tok", NOW + DAY),
            SessionStatus::Valid {
                is_subscribed: false,
                subscription_end: Some(NOW + DAY)
            }
        );

        assert_eq!(service.validate_session_at("alice", "tok2", NOW), SessionStatus::Invalid);
        assert_eq!(service.validate_session_at("alice", "", NOW), SessionStatus::Invalid);
        assert_eq!(service.validate_session_at("bob", "tok", NOW), SessionStatus::Invalid);
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let service = service();
        service.register("alice", "secret1").await.unwrap();
        let outcome = service.login("alice", "secret1").await.unwrap();

        service.logout("alice").unwrap();

        assert_eq!(
            service.validate_session("alice", &outcome.session_token),
            SessionStatus::Invalid
        );
        let stored = service.store().find("alice").unwrap();
        assert!(stored.session_token.is_none());
        assert!(stored.session_timestamp.is_none());
    }

    #[test]
    fn test_logout_is_idempotent() {
        let service = service();
        seed(&service, "alice");

        service.logout("alice").unwrap();
        service.logout("alice").unwrap();
        service.logout("nobody").unwrap();
        service.logout("").unwrap();
    }

    #[test]
    fn test_submit_initial_code() {
        let service = service();
        seed(&service, "Alice");

        let end = service.submit_code_at("Alice", "222978", 3, NOW).unwrap();
        assert_eq!(end, NOW + 90 * DAY);

        let stored = service.store().find("Alice").unwrap();
        assert_eq!(stored.subscription_end, Some(NOW + 90 * DAY));
        assert_eq!(stored.subscription_months, Some(3));
    }

    #[test]
    fn test_active_subscription_requires_renewal_code() {
        let service = service();
        seed(&service, "Alice");
        service.submit_code_at("Alice", "222978", 3, NOW).unwrap();

        let later = NOW + DAY;
        let err = service.submit_code_at("Alice", "222978", 3, later).unwrap_err();
        assert!(matches!(
            err,
            AccountError::Validation(ref msg) if msg == "Invalid access code for 3-month plan"
        ));

        let end = service.submit_code_at("Alice", "000000", 3, later).unwrap();
        assert_eq!(end, later + 3 * MONTH_MILLIS);
    }

    #[test]
    fn test_expired_subscription_requires_initial_code() {
        let service = service();
        seed(&service, "alice");
        service.store().set_subscription("alice", NOW, 3).unwrap();

        // End equal to now counts as expired
        let err = service.submit_code_at("alice", "000000", 3, NOW).unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));

        assert!(service.submit_code_at("alice", "222978", 3, NOW).is_ok());
    }

    #[test]
    fn test_non_three_month_values_use_seven_month_codes() {
        let service = service();
        seed(&service, "bob");

        let err = service.submit_code_at("bob", "222496", 7, NOW).unwrap_err();
        assert!(matches!(
            err,
            AccountError::Validation(ref msg) if msg == "Invalid access code for 7-month plan"
        ));

        let end = service.submit_code_at("bob", "111001", 7, NOW).unwrap();
        assert_eq!(end, NOW + 210 * DAY);

        // One month still selects the seven-month table but only buys 30 days
        seed(&service, "carol");
        let end = service.submit_code_at("carol", "111002", 1, NOW).unwrap();
        assert_eq!(end, NOW + 30 * DAY);
        assert_eq!(service.store().find("carol").unwrap().subscription_months, Some(1));
    }

    #[test]
    fn test_submit_code_bad_first_letter() {
        let service = service();

        for username in ["1abc", "_abc", "-abc"] {
            let err = service.submit_code_at(username, "222978", 3, NOW).unwrap_err();
            assert!(matches!(
                err,
                AccountError::Validation(ref msg) if msg == INVALID_FIRST_LETTER
            ));
        }
    }

    #[test]
    fn test_submit_code_unknown_user() {
        let service = service();
        let err = service.submit_code_at("ghost", "222114", 3, NOW).unwrap_err();
        assert!(matches!(err, AccountError::Validation(ref msg) if msg == "User not found"));
    }

    #[test]
    fn test_submit_code_rejects_zero_and_missing() {
        let service = service();
        seed(&service, "alice");

        assert!(matches!(
            service.submit_code_at("alice", "222978", 0, NOW),
            Err(AccountError::Validation(_))
        ));
        assert!(matches!(
            service.submit_code_at("alice", "", 3, NOW),
            Err(AccountError::Validation(_))
        ));
        assert!(service.store().find("alice").unwrap().subscription_end.is_none());
    }

    #[test]
    fn test_submit_code_overflow_is_rejected() {
        let service = service();
        seed(&service, "alice");

        let err = service.submit_code_at("alice", "111000", u32::MAX, NOW).unwrap_err();
        assert!(matches!(err, AccountError::Validation(ref msg) if msg.contains("out of range")));
    }

    #[cfg(target_os = "linux")]
    mod failing_storage {
        use super::*;
        use crate::wal::wal::{Wal, WalOperation};
        use std::path::PathBuf;

        /// Every append to /dev/full fails, so all mutations hit the WAL error path
        fn service_on_full_disk(seed: &[WalOperation]) -> AccountService {
            let wal = Wal::new(PathBuf::from("/dev/full")).unwrap();
            AccountService::new(
                Arc::new(UserStore::restore(wal, seed)),
                Arc::new(CodeTable::builtin().unwrap()),
            )
        }

        fn alice_with_session() -> Vec<WalOperation> {
            vec![
                WalOperation::InsertUser {
                    username: "Alice".to_string(),
                    password_hash: hash_password("secret1").unwrap(),
                },
                WalOperation::SetSession {
                    username: "Alice".to_string(),
                    token: "tok".to_string(),
                    timestamp: NOW,
                },
            ]
        }

        fn assert_internal(err: &AccountError, expected: &str) {
            assert!(
                matches!(err, AccountError::Internal { context, .. } if *context == expected),
                "unexpected error: {:?}",
                err
            );
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(err.to_string(), expected);
        }

        #[tokio::test]
        async fn test_register_storage_failure() {
            let service = service_on_full_disk(&[]);

            let err = service.register("alice", "secret1").await.unwrap_err();
            assert_internal(&err, "Registration failed");
            assert!(service.store().find("alice").is_none());
        }

        #[tokio::test]
        async fn test_login_storage_failure() {
            let service = service_on_full_disk(&alice_with_session());

            let err = service.login_at("Alice", "secret1", NOW + DAY).await.unwrap_err();
            assert_internal(&err, "Login failed");

            let stored = service.store().find("Alice").unwrap();
            assert_eq!(stored.session_token.as_deref(), Some("tok"));
            assert_eq!(stored.session_timestamp, Some(NOW));
        }

        #[test]
        fn test_logout_storage_failure() {
            let service = service_on_full_disk(&alice_with_session());

            let err = service.logout("Alice").unwrap_err();
            assert_internal(&err, "Logout failed");
            assert_eq!(
                service.validate_session_at("Alice", "tok", NOW),
                SessionStatus::Valid {
                    is_subscribed: false,
                    subscription_end: None
                }
            );
        }

        #[test]
        fn test_submit_code_storage_failure() {
            let service = service_on_full_disk(&alice_with_session());

            let err = service.submit_code_at("Alice", "222978", 3, NOW).unwrap_err();
            assert_internal(&err, "Failed to process code");

            let stored = service.store().find("Alice").unwrap();
            assert!(stored.subscription_end.is_none());
            assert!(stored.subscription_months.is_none());
        }
    }
}
