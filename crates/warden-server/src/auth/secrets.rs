//! Random secrets: confirmation codes and member node API keys.

use rand::RngExt;
use sha2::{Digest, Sha256};

const API_KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of the random part of an API key.
pub const API_KEY_RANDOM_LEN: usize = 48;

/// Number of digits in a confirmation code.
pub const CONFIRMATION_CODE_LEN: usize = 10;

/// A numeric confirmation code; leading zeros allowed.
pub fn confirmation_code() -> String {
    let mut rng = rand::rng();
    (0..CONFIRMATION_CODE_LEN)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// `<prefix>_<warden_id>_<48 alphanumerics>`.
pub fn api_key(prefix: &str, warden_id: i64) -> String {
    let mut rng = rand::rng();
    let random: String = (0..API_KEY_RANDOM_LEN)
        .map(|_| {
            let idx = rng.random_range(0..API_KEY_CHARSET.len());
            char::from(API_KEY_CHARSET[idx])
        })
        .collect();
    format!("{prefix}_{warden_id}_{random}")
}

/// SHA-256 hex digest of an API key. Only the digest is persisted.
pub fn api_key_digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_code_is_ten_digits() {
        let code = confirmation_code();
        assert_eq!(code.len(), CONFIRMATION_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn api_key_shape() {
        let key = api_key("pdn", 17);
        let mut parts = key.splitn(3, '_');
        assert_eq!(parts.next(), Some("pdn"));
        assert_eq!(parts.next(), Some("17"));
        let random = parts.next().unwrap();
        assert_eq!(random.len(), API_KEY_RANDOM_LEN);
        assert!(random.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn api_keys_are_unique() {
        assert_ne!(api_key("nn", 1), api_key("nn", 1));
    }

    #[test]
    fn digest_is_stable_hex() {
        let d = api_key_digest("nn_1_abc");
        assert_eq!(d, api_key_digest("nn_1_abc"));
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
