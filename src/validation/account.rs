use regex::Regex;
use std::sync::LazyLock;

pub const MIN_PASSWORD_LEN: usize = 6;

pub const MISSING_CREDENTIALS: &str = "Username and password are required";
pub const INVALID_USERNAME: &str =
    "Username must start with a letter and contain only letters, numbers, or underscores";
pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 6 characters long";
pub const INVALID_FIRST_LETTER: &str = "Invalid username: First letter must be A-Z";

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("username pattern is valid"));

/// Letter first, then letters, digits or underscores
pub fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

/// Length is counted in characters, not bytes
pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

/// Check a registration request, returning the message for the first failed rule
pub fn validate_registration(username: &str, password: &str) -> Result<(), &'static str> {
    if username.is_empty() || password.is_empty() {
        return Err(MISSING_CREDENTIALS);
    }

    if !is_valid_username(username) {
        return Err(INVALID_USERNAME);
    }

    if !is_valid_password(password) {
        return Err(PASSWORD_TOO_SHORT);
    }

    Ok(())
}

/// Uppercased first letter of a username, if it is an ASCII letter
pub fn code_letter(username: &str) -> Option<char> {
    username
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| c.is_ascii_uppercase())
}
