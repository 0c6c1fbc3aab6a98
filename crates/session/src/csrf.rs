//! Per-session CSRF token generation

use rand::RngExt;

/// Number of random bytes behind each CSRF token.
pub const CSRF_TOKEN_BYTES: usize = 32;

/// Generate a fresh CSRF token: 32 random bytes as 64 lowercase hex chars.
pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; CSRF_TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Whether `token` looks like one produced by `generate_csrf_token`.
pub fn is_well_formed(token: &str) -> bool {
    token.len() == CSRF_TOKEN_BYTES * 2
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
