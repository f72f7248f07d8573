//! Content identity of a script body.

use sha1::{Digest, Sha1};

/// Length of a hex-encoded identity.
pub const IDENTITY_LEN: usize = 40;

/// Returns the SHA-1 digest of `body` as 40 lowercase hex characters.
///
/// The server keys its script cache by the same digest, so this must stay SHA-1.
pub fn sha1_hex(body: &str) -> String {
    hex::encode(Sha1::digest(body.as_bytes()))
}

/// Returns true if `s` looks like an identity produced by [`sha1_hex`].
pub fn is_identity(s: &str) -> bool {
    s.len() == IDENTITY_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(sha1_hex(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(sha1_hex("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(sha1_hex("return 1"), "e0e1f9fabfc9d4800c877a703b823ac0578ff8db");
    }

    #[test]
    fn test_shape() {
        let id = sha1_hex("return redis.call('GET', KEYS[1])");
        assert_eq!(id.len(), IDENTITY_LEN);
        assert!(is_identity(&id));
        assert!(!is_identity(&id.to_uppercase()));
        assert!(!is_identity("abc"));
    }

    #[test]
    fn test_raw_bytes_matter() {
        assert_ne!(sha1_hex("return 1"), sha1_hex("return 1 "));
        assert_ne!(sha1_hex("return 1"), sha1_hex("RETURN 1"));
    }
}
