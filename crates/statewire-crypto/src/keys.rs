//! Key material and settlement-address derivation.
//!
//! An [`Address`] is the last 20 bytes of the keccak-256 digest of the
//! uncompressed secp256k1 public key (the leading point-encoding byte
//! stripped). Deriving the address from the key rather than registering
//! a separate identity keeps the off-chain identity and the on-chain
//! settlement account the same thing.

use k256::ecdsa::{SigningKey, VerifyingKey};

use statewire_types::{Address, Signature, StatewireError};

use crate::hash::keccak256;
use crate::sig::eth_signed_digest;

/// Anything that can authorize channel states for one settlement address.
///
/// The production implementation is [`KeyPair`]; tests and embedders with
/// external key custody provide their own.
pub trait Signer {
    /// Produce a recoverable signature over `digest`.
    fn sign(&self, digest: &[u8; 32]) -> statewire_types::Result<Signature>;

    /// The settlement address signatures from this signer recover to.
    fn address(&self) -> Address;
}

/// An in-memory secp256k1 keypair.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
    address: Address,
}

impl KeyPair {
    /// Generate a fresh random keypair.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    #[must_use]
    pub fn from_signing_key(signing: SigningKey) -> Self {
        let address = address_of(signing.verifying_key());
        Self { signing, address }
    }

    /// Load a keypair from a 32-byte secret, hex encoded (`0x` optional).
    pub fn from_secret_hex(s: &str) -> statewire_types::Result<Self> {
        let raw = hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| StatewireError::Configuration(format!("bad secret key hex: {e}")))?;
        let signing = SigningKey::from_slice(&raw)
            .map_err(|e| StatewireError::Configuration(format!("bad secret key: {e}")))?;
        Ok(Self::from_signing_key(signing))
    }

    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing.verifying_key()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Signer for KeyPair {
    fn sign(&self, digest: &[u8; 32]) -> statewire_types::Result<Signature> {
        let prehash = eth_signed_digest(digest);
        let (rs, rec_id) = self
            .signing
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| StatewireError::InvalidSignature {
                reason: format!("signing failed: {e}"),
            })?;
        let mut bytes = [0u8; Signature::LEN];
        bytes[..64].copy_from_slice(&rs.to_bytes());
        bytes[64] = rec_id.to_byte() + 27;
        Ok(Signature::from_bytes(bytes.to_vec()))
    }

    fn address(&self) -> Address {
        self.address
    }
}

/// The settlement address of a public key: keccak of the uncompressed
/// point with the encoding byte stripped, truncated to the low 20 bytes.
#[must_use]
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&digest[12..]);
    Address::from_bytes(addr)
}
