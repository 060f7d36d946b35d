use crate::models::user::User;
use crate::wal::wal::{Wal, WalOperation};
use anyhow::{bail, Context, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("User already exists: {0}")]
    Duplicate(String),

    #[error("Failed to persist change: {0}")]
    Persistence(#[from] anyhow::Error),
}

/// Where the user collection lives, parsed from the storage connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUri {
    /// Nothing survives a restart
    Memory,
    /// Write-ahead log at the given path
    File(PathBuf),
}

impl StorageUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();

        if uri.is_empty() {
            bail!("Storage URI must not be empty");
        }

        if uri == "memory:" || uri == "memory://" {
            return Ok(StorageUri::Memory);
        }

        let path = uri
            .strip_prefix("file://")
            .or_else(|| uri.strip_prefix("file:"))
            .unwrap_or(uri);

        if path.is_empty() {
            bail!("Storage URI '{}' has no file path", uri);
        }

        if path.contains("://") {
            bail!("Unsupported storage URI scheme in '{}'", uri);
        }

        Ok(StorageUri::File(PathBuf::from(path)))
    }
}

/// The `users` collection: documents keyed by username
///
/// Reads are served from memory. When opened on a file every mutation is
/// appended to the WAL before it becomes visible, and the WAL is replayed
/// on open.
///
/// The append is a blocking write made while the user's shard lock is held,
/// so a stalled disk also stalls other writers to that shard.
pub struct UserStore {
    users: DashMap<String, User>,
    wal: Option<Wal>,
}

impl UserStore {
    /// Create a store that keeps users in memory only
    pub fn in_memory() -> Self {
        Self {
            users: DashMap::new(),
            wal: None,
        }
    }

    /// Open the store described by `uri`, replaying any existing WAL
    pub fn open(uri: &StorageUri) -> Result<Self> {
        match uri {
            StorageUri::Memory => {
                info!("Opening in-memory user store");
                Ok(Self::in_memory())
            }
            StorageUri::File(path) => {
                let wal = Wal::new(path.clone())
                    .context(format!("Failed to open user store at '{}'", path.display()))?;

                let operations = wal.replay().context("Failed to replay WAL")?;
                let store = Self::restore(wal, &operations);

                info!(
                    wal_path = %path.display(),
                    operations_replayed = operations.len(),
                    users_loaded = store.len(),
                    "User store opened"
                );

                Ok(store)
            }
        }
    }

    /// Rebuild the collection from already-logged operations, appending
    /// future mutations to `wal`
    pub(crate) fn restore(wal: Wal, operations: &[WalOperation]) -> Self {
        let store = Self {
            users: DashMap::new(),
            wal: Some(wal),
        };

        for op in operations {
            store.apply(op);
        }

        store
    }

    fn log(&self, op: &WalOperation) -> Result<(), StoreError> {
        if let Some(wal) = &self.wal {
            wal.log_operation(op)?;
        }
        Ok(())
    }

    fn apply(&self, op: &WalOperation) {
        match op {
            WalOperation::InsertUser {
                username,
                password_hash,
            } => {
                self.users
                    .entry(username.clone())
                    .or_insert_with(|| User::new(username.clone(), password_hash.clone()));
            }
            WalOperation::SetSession {
                username,
                token,
                timestamp,
            } => {
                if let Some(mut user) = self.users.get_mut(username) {
                    user.session_token = Some(token.clone());
                    user.session_timestamp = Some(*timestamp);
                }
            }
            WalOperation::ClearSession { username } => {
                if let Some(mut user) = self.users.get_mut(username) {
                    user.session_token = None;
                    user.session_timestamp = None;
                }
            }
            WalOperation::SetSubscription {
                username,
                end,
                months,
            } => {
                if let Some(mut user) = self.users.get_mut(username) {
                    user.subscription_end = Some(*end);
                    user.subscription_months = Some(*months);
                }
            }
        }
    }

    /// Look a user up by username
    pub fn find(&self, username: &str) -> Option<User> {
        self.users.get(username).map(|entry| entry.value().clone())
    }

    /// Insert a new user, failing if the username is taken
    pub fn insert(&self, user: User) -> Result<(), StoreError> {
        match self.users.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(user.username)),
            Entry::Vacant(slot) => {
                self.log(&WalOperation::InsertUser {
                    username: user.username.clone(),
                    password_hash: user.password_hash.clone(),
                })?;
                slot.insert(user);
                Ok(())
            }
        }
    }

    /// Record a new session. Returns false if no such user exists
    pub fn set_session(
        &self,
        username: &str,
        token: &str,
        timestamp: i64,
    ) -> Result<bool, StoreError> {
        let Some(mut user) = self.users.get_mut(username) else {
            return Ok(false);
        };

        self.log(&WalOperation::SetSession {
            username: username.to_string(),
            token: token.to_string(),
            timestamp,
        })?;

        user.session_token = Some(token.to_string());
        user.session_timestamp = Some(timestamp);
        Ok(true)
    }

    /// Drop the session fields. Unknown users and inactive sessions are a no-op
    pub fn clear_session(&self, username: &str) -> Result<(), StoreError> {
        let Some(mut user) = self.users.get_mut(username) else {
            return Ok(());
        };

        if user.session_token.is_none() && user.session_timestamp.is_none() {
            return Ok(());
        }

        self.log(&WalOperation::ClearSession {
            username: username.to_string(),
        })?;

        user.session_token = None;
        user.session_timestamp = None;
        Ok(())
    }

    /// Overwrite the subscription fields. Returns false if no such user exists
    pub fn set_subscription(
        &self,
        username: &str,
        end: i64,
        months: u32,
    ) -> Result<bool, StoreError> {
        let Some(mut user) = self.users.get_mut(username) else {
            return Ok(false);
        };

        self.log(&WalOperation::SetSubscription {
            username: username.to_string(),
            end,
            months,
        })?;

        user.subscription_end = Some(end);
        user.subscription_months = Some(months);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Flush the WAL to disk. The store stays usable afterwards
    pub fn shutdown(&self) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.sync()?;
            info!(wal_path = %wal.path().display(), users = self.len(), "User store synced");
        } else {
            warn!(users = self.len(), "In-memory user store shut down, data is not persisted");
        }
        Ok(())
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
