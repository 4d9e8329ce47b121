//! Password hashing compatible with ASP.NET Core Identity's default
//! hasher (format version 3).
//!
//! The stored text is standard base64 over: a `0x01` marker byte, then
//! three big-endian `u32`s (PRF identifier, iteration count, salt
//! length), the salt, and the PBKDF2 subkey. Only PRF 1 (HMAC-SHA256) is
//! produced or accepted; the legacy SHA1 format carries a `0x00` marker
//! and is rejected as unsupported. Either server can verify what the
//! other wrote.

use base64ct::{Base64, Encoding};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::sync::OnceLock;

const FORMAT_MARKER: u8 = 0x01;
const PRF_HMAC_SHA256: u32 = 1;
/// Iteration count used by the identity framework's default hasher.
const DEFAULT_ITERATIONS: u32 = 10_000;
const SALT_LEN: usize = 16;
const SUBKEY_LEN: usize = 32;
/// Marker byte plus three big-endian u32 fields.
const HEADER_LEN: usize = 13;

/// Failure to decode a stored hash. Surfaces to callers as a store-class
/// failure, never as a credential failure.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("illegal base64 data: {0}")]
    Base64(#[from] base64ct::Error),

    #[error("truncated hash payload")]
    Truncated,

    #[error("unsupported format marker {0:#04x}")]
    UnsupportedFormat(u8),

    #[error("unsupported PRF identifier {0}")]
    UnsupportedPrf(u32),

    #[error("implausible iteration count or salt length")]
    BadParameters,
}

/// Hash a password into the framework's v3 encoded text with a fresh
/// random salt.
pub fn hash_password(plain: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut subkey = [0u8; SUBKEY_LEN];
    pbkdf2_hmac::<Sha256>(plain.as_bytes(), &salt, DEFAULT_ITERATIONS, &mut subkey);

    let mut raw = Vec::with_capacity(HEADER_LEN + SALT_LEN + SUBKEY_LEN);
    raw.push(FORMAT_MARKER);
    raw.extend_from_slice(&PRF_HMAC_SHA256.to_be_bytes());
    raw.extend_from_slice(&DEFAULT_ITERATIONS.to_be_bytes());
    raw.extend_from_slice(&(SALT_LEN as u32).to_be_bytes());
    raw.extend_from_slice(&salt);
    raw.extend_from_slice(&subkey);
    Base64::encode_string(&raw)
}

/// Check `plain` against a stored v3 encoded hash. Returns `Ok(false)`
/// for a well-formed hash that does not match; errors only when the
/// stored text cannot be decoded.
pub fn verify_password(encoded: &str, plain: &str) -> Result<bool, HashError> {
    let raw = Base64::decode_vec(encoded)?;
    if raw.len() <= HEADER_LEN {
        return Err(HashError::Truncated);
    }
    if raw[0] != FORMAT_MARKER {
        return Err(HashError::UnsupportedFormat(raw[0]));
    }
    let prf = be_u32(&raw, 1);
    let iterations = be_u32(&raw, 5);
    let salt_len = be_u32(&raw, 9) as usize;
    if prf != PRF_HMAC_SHA256 {
        return Err(HashError::UnsupportedPrf(prf));
    }
    if iterations == 0 || salt_len < 8 {
        return Err(HashError::BadParameters);
    }
    if raw.len() <= HEADER_LEN + salt_len {
        return Err(HashError::Truncated);
    }
    let salt = &raw[HEADER_LEN..HEADER_LEN + salt_len];
    let stored = &raw[HEADER_LEN + salt_len..];

    let mut subkey = vec![0u8; stored.len()];
    pbkdf2_hmac::<Sha256>(plain.as_bytes(), salt, iterations, &mut subkey);
    Ok(constant_time_eq(stored, &subkey))
}

/// Precomputed hash of the empty string, substituted when a lookup
/// misses so that authentication always compares against a real encoded
/// hash regardless of whether the name exists.
pub(crate) fn empty_hash() -> &'static str {
    static EMPTY: OnceLock<String> = OnceLock::new();
    EMPTY.get_or_init(|| hash_password(""))
}

fn be_u32(raw: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

/// Compare without short-circuiting on the first mismatched byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // Hashes written by ASP.NET Core Identity's default hasher.
    const ASPNET_HASH: &str =
        "AQAAAAEAACcQAAAAEO4k5r1SgFuCYAS8xfu/Mnu5iZUqh+DgSRU4IyJpD+mVo4KdbI1BwiF3KcY1V6AapQ==";
    const ASPNET_PASSWORD: &str = "In2Egypt!";

    #[test]
    fn verifies_framework_written_hash() {
        assert!(verify_password(ASPNET_HASH, ASPNET_PASSWORD).unwrap());
        assert!(!verify_password(ASPNET_HASH, "not the password").unwrap());
        assert!(!verify_password(ASPNET_HASH, "").unwrap());
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("Secur3P@ssw0rd!");
        assert!(verify_password(&hash, "Secur3P@ssw0rd!").unwrap());
        assert!(!verify_password(&hash, "wrong-password").unwrap());
    }

    #[test]
    fn salts_differ_between_calls() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn rejects_malformed_base64() {
        assert!(matches!(
            verify_password("!!not base64!!", "x"),
            Err(HashError::Base64(_))
        ));
    }

    #[test]
    fn rejects_legacy_format_marker() {
        let mut raw = Base64::decode_vec(ASPNET_HASH).unwrap();
        raw[0] = 0x00;
        let legacy = Base64::encode_string(&raw);
        assert!(matches!(
            verify_password(&legacy, ASPNET_PASSWORD),
            Err(HashError::UnsupportedFormat(0x00))
        ));
    }

    #[test]
    fn rejects_truncated_payload() {
        let short = Base64::encode_string(&[FORMAT_MARKER, 0, 0, 0]);
        assert!(matches!(
            verify_password(&short, "x"),
            Err(HashError::Truncated)
        ));
    }

    #[test]
    fn empty_hash_is_stable_and_real() {
        assert_eq!(empty_hash(), empty_hash());
        assert!(verify_password(empty_hash(), "").unwrap());
        assert!(!verify_password(empty_hash(), "anything").unwrap());
    }
}
