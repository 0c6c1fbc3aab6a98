//! Access credential checks
//!
//! The access token is treated as opaque except for two structural
//! properties: it must be three dot-separated base64url segments, and the
//! middle segment may carry a JSON payload with an `exp` claim (unix
//! seconds). Signatures are never verified client-side.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Whether `token` has the shape of a bearer token: exactly three
/// non-empty base64url segments separated by dots.
pub fn is_structurally_valid(token: &str) -> bool {
    let mut segments = 0usize;
    for segment in token.split('.') {
        segments += 1;
        if segment.is_empty() || !segment.bytes().all(is_base64url_byte) {
            return false;
        }
    }
    segments == 3
}

fn is_base64url_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Expiry of the token as unix milliseconds, decoded from the payload's
/// `exp` claim. `None` for malformed tokens or payloads without `exp`.
pub fn expires_at_millis(token: &str) -> Option<u64> {
    if !is_structurally_valid(token) {
        return None;
    }
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?;
    let secs = exp
        .as_u64()
        .or_else(|| exp.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))?;
    secs.checked_mul(1000)
}

/// Whether the token's `exp` claim lies at or before `now_millis`.
///
/// Tokens without a readable expiry are not considered expired; the
/// backend stays the authority and answers 401 if they are.
pub fn is_expired(token: &str, now_millis: u64) -> bool {
    expires_at_millis(token).is_some_and(|exp| exp <= now_millis)
}

#[cfg(test)]
pub(crate) fn token_with_exp(exp_secs: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"42","exp":{exp_secs}}}"#));
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_base64url_segments_are_valid() {
        assert!(is_structurally_valid("aGVhZGVy.cGF5bG9hZA.c2ln"));
        assert!(is_structurally_valid("a-b_c.d.e"));
        assert!(is_structurally_valid(&token_with_exp(1)));
    }

    #[test]
    fn wrong_segment_count_is_invalid() {
        assert!(!is_structurally_valid(""));
        assert!(!is_structurally_valid("single"));
        assert!(!is_structurally_valid("two.parts"));
        assert!(!is_structurally_valid("a.b.c.d"));
    }

    #[test]
    fn empty_segments_are_invalid() {
        assert!(!is_structurally_valid("a..c"));
        assert!(!is_structurally_valid(".b.c"));
        assert!(!is_structurally_valid("a.b."));
    }

    #[test]
    fn non_base64url_characters_are_invalid() {
        assert!(!is_structurally_valid("a+b.c.d"));
        assert!(!is_structurally_valid("a.b/c.d"));
        assert!(!is_structurally_valid("a.b.c=="));
        assert!(!is_structurally_valid("Bearer a.b.c"));
        assert!(!is_structurally_valid("undefined"));
    }

    #[test]
    fn expiry_is_decoded_from_payload() {
        let token = token_with_exp(1_700_000_000);
        assert_eq!(expires_at_millis(&token), Some(1_700_000_000_000));
    }

    #[test]
    fn expiry_missing_for_opaque_payload() {
        assert_eq!(expires_at_millis("aGVhZGVy.cGF5bG9hZA.c2ln"), None);
        assert_eq!(expires_at_millis("not-a-token"), None);
    }

    #[test]
    fn expired_compares_against_now() {
        let token = token_with_exp(1_000);
        assert!(is_expired(&token, 1_000_000));
        assert!(is_expired(&token, 2_000_000));
        assert!(!is_expired(&token, 999_999));
    }

    #[test]
    fn token_without_exp_never_expires() {
        assert!(!is_expired("aGVhZGVy.cGF5bG9hZA.c2ln", u64::MAX));
    }

    #[test]
    fn now_millis_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
