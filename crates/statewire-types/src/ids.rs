//! Identifiers used throughout statewire.
//!
//! A [`ChannelId`] is a 32-byte digest derived from both parties plus
//! timestamp material, so collisions between independently created
//! channels are cryptographically negligible. An [`Address`] is a 20-byte
//! settlement account identifier (the keccak-derived form of a secp256k1
//! public key — derivation lives in `statewire-crypto`).

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, StatewireError};

/// Ledger block height. Dispute windows and HTLC expirations are judged
/// against this, never against wall-clock time.
pub type BlockHeight = u64;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte settlement account identifier on the underlying ledger.
///
/// Serializes as a `0x`-prefixed hex string so it can key JSON maps
/// (the gateway balance payloads are keyed by address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Address(pub [u8; 20]);

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

impl Address {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Parse a `0x`-prefixed (or bare) 40-hex-digit address.
    pub fn from_hex(s: &str) -> Result<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(stripped)
            .map_err(|e| StatewireError::Configuration(format!("bad address hex: {e}")))?;
        let bytes: [u8; 20] = raw.try_into().map_err(|_| {
            StatewireError::Configuration(format!("address must be 20 bytes: {s}"))
        })?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// ChannelId
// ---------------------------------------------------------------------------

/// Globally unique, opaque 32-byte channel identifier.
///
/// Serializes as a `0x`-prefixed hex string (the channel name carried in
/// gateway messages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ChannelId(pub [u8; 32]);

impl Serialize for ChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let stripped = s.strip_prefix("0x").unwrap_or(&s);
        let raw = hex::decode(stripped).map_err(D::Error::custom)?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| D::Error::custom("channel id must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

impl ChannelId {
    /// Derive a fresh channel id from both parties plus timestamp and
    /// random salt material.
    ///
    /// Every derivation is unique even for the same founder/partner pair,
    /// so a pair may open several channels over time.
    #[must_use]
    pub fn derive(founder: &Address, partner: &Address) -> Self {
        use sha2::{Digest, Sha256};
        let nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        let salt: [u8; 8] = rand::random();
        let mut hasher = Sha256::new();
        hasher.update(b"statewire:channel_id:v1:");
        hasher.update(founder.as_bytes());
        hasher.update(partner.as_bytes());
        hasher.update(nanos.to_le_bytes());
        hasher.update(salt);
        Self(hasher.finalize().into())
    }

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

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// TxId
// ---------------------------------------------------------------------------

/// Opaque ledger transaction identifier returned by the external ledger
/// client (typically a `0x`-prefixed hash string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub String);

impl TxId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// A recoverable ECDSA signature blob (`r ‖ s ‖ v`, 65 bytes).
///
/// Stored as raw bytes here; interpretation and verification live in
/// `statewire-crypto`. The settlement contract identifies the signer from
/// the signature alone, which is why the recovery byte `v` is carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Expected byte length: 32 (r) + 32 (s) + 1 (v).
    pub const LEN: usize = 65;

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Structural check only — a well-formed signature can still fail
    /// to recover to the claimed signer.
    #[must_use]
    pub fn is_wellformed(&self) -> bool {
        self.0.len() == Self::LEN
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig:{}", hex::encode(&self.0[..self.0.len().min(6)]))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
