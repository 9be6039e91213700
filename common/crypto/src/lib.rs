use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Errors produced by the common-crypto helpers.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid HMAC key length")]
    InvalidMacKey,
}

/// Sign an arbitrary byte string with HMAC-SHA256, returning lowercase hex.
///
/// Used both for the attachment broker's signed-URL grammar and for hashing
/// refresh tokens before they are stored.
pub fn hmac_sha256_hex(key: &[u8], message: &[u8]) -> Result<String, CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CryptoError::InvalidMacKey)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of two hex-encoded digests, guarding against
/// timing attacks when verifying a caller-supplied signature.
pub fn constant_time_eq_hex(expected: &str, provided: &str) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_is_deterministic() {
        let a = hmac_sha256_hex(b"secret", b"hello").unwrap();
        let b = hmac_sha256_hex(b"secret", b"hello").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hmac_differs_by_key() {
        let a = hmac_sha256_hex(b"secret-one", b"hello").unwrap();
        let b = hmac_sha256_hex(b"secret-two", b"hello").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn constant_time_eq_matches_and_mismatches() {
        assert!(constant_time_eq_hex("abcd", "abcd"));
        assert!(!constant_time_eq_hex("abcd", "abce"));
        assert!(!constant_time_eq_hex("abc", "abcd"));
    }
}
