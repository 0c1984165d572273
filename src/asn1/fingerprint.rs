//! SHA-256 fingerprinting, used both as the content-dedupe key (spec §8
//! invariant 1) and as the v2 LDAP `cn` value (spec §4.5).

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of `data`, matching the glossary's
/// definition of "Fingerprint".
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_vector() {
        // sha256("") well-known test vector
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn is_deterministic() {
        let data = b"icao-pkd-fixture";
        assert_eq!(sha256_hex(data), sha256_hex(data));
    }

    #[test]
    fn differs_for_different_inputs() {
        assert_ne!(sha256_hex(b"a"), sha256_hex(b"b"));
    }
}
