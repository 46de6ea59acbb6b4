//! Digest helpers.
//!
//! Keccak-256 is used everywhere the settlement contract computes a
//! digest (state commitments, address derivation). SHA-256 is used for
//! HTLC hash locks, matching the hash primitive the contract's lock
//! branch checks.

use sha2::Sha256;
use sha3::{Digest, Keccak256};

/// Keccak-256 digest of `data`.
#[must_use]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// SHA-256 digest of `data`.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_known_vector() {
        // keccak256("") — the well-known empty-input digest.
        let digest = keccak256(b"");
        assert_eq!(
            hex::encode(digest),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn sha256_known_vector() {
        let digest = sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digests_are_input_sensitive() {
        assert_ne!(keccak256(b"a"), keccak256(b"b"));
        assert_ne!(sha256(b"a"), sha256(b"b"));
    }
}
