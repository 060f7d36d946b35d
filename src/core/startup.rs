use anyhow::{Context, Result};
use tracing::info;

use crate::codes::table::CodeTable;
use crate::core::config::Config;
use crate::core::state::AppState;
use crate::stores::user_store::UserStore;

// Runs at boot time. Any failure here is fatal: the service never starts
// without its user store and code table.
pub fn build_state(config: &Config) -> Result<AppState> {
    let storage_uri = config.storage_uri().context("Invalid storage uri")?;

    let store = UserStore::open(&storage_uri)
        .context(format!("Failed to open user store '{}'", config.storage.uri))?;

    let codes = CodeTable::load(config.codes.path.as_deref())
        .context("Failed to load access code table")?;

    info!(
        storage = ?storage_uri,
        users = store.len(),
        code_letters = codes.len(),
        custom_codes = config.codes.path.is_some(),
        "Account state initialized"
    );

    Ok(AppState::new(store, codes))
}
