//! Password hashing
//!
//! Hashes use the shadow `$id$salt$digest` layout with id `5` and digest
//! `base64(sha256(salt || password))`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use chrono::Utc;
use sha2::{Digest, Sha256};

const SCHEME: &str = "5";

/// Salt derived from the current time.
pub fn generate_salt() -> String {
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp());
    STANDARD_NO_PAD.encode(nanos.to_be_bytes())
}

/// Hash `password` with `salt`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    format!("${SCHEME}${salt}${}", STANDARD_NO_PAD.encode(&digest[..]))
}

/// Hash with a fresh salt.
pub fn hash_new(password: &str) -> String {
    hash_password(password, &generate_salt())
}

/// Check `password` against a shadow hash field.
///
/// An empty field accepts only the empty password; a locked (`!`) or
/// unrecognized field accepts nothing.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.is_empty() {
        return password.is_empty();
    }
    let mut parts = stored.splitn(4, '$');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(""), Some(SCHEME), Some(salt), Some(_)) => {
            let candidate = hash_password(password, salt);
            constant_time_eq(candidate.as_bytes(), stored.as_bytes())
        }
        _ => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Days since the Unix epoch, for shadow aging fields.
pub fn days_since_epoch() -> u64 {
    u64::try_from(Utc::now().timestamp() / 86_400).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_layout() {
        let hash = hash_password("secret", "salt");
        assert!(hash.starts_with("$5$salt$"));
        assert!(!hash.contains(':'));
        assert_eq!(hash, hash_password("secret", "salt"));
        assert_ne!(hash, hash_password("secret", "pepper"));
    }

    #[test]
    fn test_verify() {
        let hash = hash_new("hunter2");
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[test]
    fn test_locked_and_empty_fields() {
        let hash = hash_new("pw");
        assert!(!verify_password("pw", &format!("!{hash}")));
        assert!(!verify_password("pw", "!"));
        assert!(!verify_password("pw", "*"));
        assert!(verify_password("", ""));
        assert!(!verify_password("pw", ""));
    }

    #[test]
    fn test_salt_is_field_safe() {
        let salt = generate_salt();
        assert!(!salt.is_empty());
        assert!(!salt.contains(['$', ':']));
    }
}
