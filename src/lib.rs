pub mod codes;
pub mod core;
pub mod handlers;
pub mod models;
pub mod services;
pub mod stores;
pub mod utils;
pub mod validation;
pub mod wal;
