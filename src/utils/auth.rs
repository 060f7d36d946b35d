/// Compare two secrets in constant time
///
/// Used for session tokens so that a mismatch does not leak how many leading
/// characters were correct. Different lengths never match.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len()
        && provided
            .as_bytes()
            .iter()
            .zip(expected.as_bytes().iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
