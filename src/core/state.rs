// Application state (AppState)

use crate::codes::table::CodeTable;
use crate::services::account::AccountService;
use crate::stores::user_store::UserStore;
use std::sync::Arc;

/// Shared application state
///
/// Handlers only ever reach storage through the account service; the store
/// handle is kept here as well so startup and shutdown can manage it.
#[derive(Clone)]
pub struct AppState {
    /// Account operations
    pub accounts: Arc<AccountService>,

    /// User collection, opened at startup and synced at shutdown
    pub store: Arc<UserStore>,
}

impl AppState {
    pub fn new(store: UserStore, codes: CodeTable) -> Self {
        let store = Arc::new(store);
        let accounts = Arc::new(AccountService::new(Arc::clone(&store), Arc::new(codes)));

        Self { accounts, store }
    }
}
