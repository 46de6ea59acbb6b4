//! Hash-Time-Locked-Contract (HTLC) lock types.
//!
//! An [`HtlcLock`] reserves part of the sender's channel balance behind a
//! hash lock: the receiver chose a [`Secret`] and published its SHA-256
//! digest ([`LockHash`]). Revealing the secret before `expiration` moves
//! the amount to the receiver; after `expiration` the sender may reclaim
//! it on-chain without the receiver's cooperation.

use std::fmt;

use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::ids::{Address, BlockHeight};

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// The 32-byte preimage (the `R` value) that unlocks an HTLC.
///
/// Chosen by the receiver and kept private until reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Secret(pub [u8; 32]);

impl Secret {
    /// Generate a fresh random secret.
    #[must_use]
    pub fn generate() -> Self {
        Self(rand::random())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The hash lock this secret opens.
    #[must_use]
    pub fn lock_hash(&self) -> LockHash {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        LockHash(hasher.finalize().into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(D::Error::custom)?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| D::Error::custom("secret must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

// ---------------------------------------------------------------------------
// LockHash
// ---------------------------------------------------------------------------

/// SHA-256 digest of a [`Secret`]; the public half of a hash lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct LockHash(pub [u8; 32]);

impl LockHash {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for LockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock:{}", hex::encode(&self.0[..8]))
    }
}

impl Serialize for LockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for LockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(D::Error::custom)?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| D::Error::custom("lock hash must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

// ---------------------------------------------------------------------------
// HtlcLock
// ---------------------------------------------------------------------------

/// One conditional transfer nested inside a channel state.
///
/// The locked `amount` has already been deducted from the sender's balance
/// in the channel record; it lives here until the lock resolves (reveal
/// credits the receiver, expiry refunds the sender).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcLock {
    /// Hash of the receiver-chosen secret.
    pub lock_hash: LockHash,
    /// Amount reserved against the sender's balance.
    pub amount: Decimal,
    /// Party whose balance funds the lock.
    pub sender: Address,
    /// Party who can claim by revealing the secret.
    pub receiver: Address,
    /// Absolute ledger height after which the sender may reclaim.
    pub expiration: BlockHeight,
    /// Revealed preimage, if any. `None` until reveal.
    pub secret: Option<Secret>,
}

impl HtlcLock {
    /// Create an unrevealed lock.
    #[must_use]
    pub fn new(
        lock_hash: LockHash,
        amount: Decimal,
        sender: Address,
        receiver: Address,
        expiration: BlockHeight,
    ) -> Self {
        Self {
            lock_hash,
            amount,
            sender,
            receiver,
            expiration,
            secret: None,
        }
    }

    /// Whether the sender may reclaim at `height`. Only strictly past the
    /// expiration height, never at it.
    #[must_use]
    pub fn is_expired(&self, height: BlockHeight) -> bool {
        height > self.expiration
    }

    /// Whether `secret` opens this lock.
    #[must_use]
    pub fn verify_secret(&self, secret: &Secret) -> bool {
        secret.lock_hash() == self.lock_hash
    }

    /// Whether the expiration leaves at least `margin` blocks of headroom
    /// beyond `height`. Proposals whose locks fail this are rejected.
    #[must_use]
    pub fn expires_comfortably_after(&self, height: BlockHeight, margin: u64) -> bool {
        self.expiration > height.saturating_add(margin)
    }
}
