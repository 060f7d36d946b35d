pub mod auth;
pub mod password;
pub mod time;
pub mod token;
