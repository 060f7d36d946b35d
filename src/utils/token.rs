use anyhow::{Context, Result};
use rand::{rngs::OsRng, TryRngCore};

/// Bytes of entropy in a session token
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Create a new session token from the operating system CSPRNG
///
/// The token is hex encoded, so it is twice `SESSION_TOKEN_BYTES` long and
/// safe to embed in the WAL and in JSON bodies.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(hex::encode(bytes))
}
