//! The canonical byte encoding both parties sign.
//!
//! Every field is fixed-width and big-endian, assembled in one fixed
//! order, so both sides and the settlement contract hash the exact same
//! bytes for the same logical state. Amounts are converted to integer
//! base units (`10^AMOUNT_PRECISION` per whole token) before encoding;
//! an amount that cannot be represented exactly is rejected rather than
//! rounded.
//!
//! Layout:
//!
//! ```text
//! channel_id   32 bytes
//! nonce         8 bytes
//! founder      20 bytes
//! founder_bal   8 bytes   (base units)
//! partner      20 bytes
//! partner_bal   8 bytes   (base units)
//! [pending lock, when present:]
//!   lock_hash  32 bytes
//!   amount      8 bytes   (base units)
//!   sender     20 bytes
//!   receiver   20 bytes
//!   expiration  8 bytes
//! ```

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use statewire_types::constants::AMOUNT_PRECISION;
use statewire_types::{
    Address, BalanceSheet, Channel, ChannelId, HtlcLock, Result, StatewireError,
};

use crate::hash::keccak256;

/// Canonically encoded channel state, ready to digest and sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePayload {
    bytes: Vec<u8>,
}

impl StatePayload {
    /// Encode a channel's current state (balances plus the pending lock,
    /// if one exists).
    pub fn from_channel(channel: &Channel) -> Result<Self> {
        Self::from_parts(
            channel.channel_id,
            channel.nonce,
            channel.founder,
            channel.partner,
            &channel.balances,
            channel.pending_lock(),
        )
    }

    /// Encode an arbitrary state (used to check a proposal's signature
    /// before the proposal is applied).
    pub fn from_parts(
        channel_id: ChannelId,
        nonce: u64,
        founder: Address,
        partner: Address,
        balances: &BalanceSheet,
        lock: Option<&HtlcLock>,
    ) -> Result<Self> {
        let mut bytes = Vec::with_capacity(96 + if lock.is_some() { 88 } else { 0 });
        bytes.extend_from_slice(channel_id.as_bytes());
        bytes.extend_from_slice(&nonce.to_be_bytes());
        bytes.extend_from_slice(founder.as_bytes());
        bytes.extend_from_slice(&to_base_units(balances.get(&founder))?.to_be_bytes());
        bytes.extend_from_slice(partner.as_bytes());
        bytes.extend_from_slice(&to_base_units(balances.get(&partner))?.to_be_bytes());
        if let Some(lock) = lock {
            bytes.extend_from_slice(lock.lock_hash.as_bytes());
            bytes.extend_from_slice(&to_base_units(lock.amount)?.to_be_bytes());
            bytes.extend_from_slice(lock.sender.as_bytes());
            bytes.extend_from_slice(lock.receiver.as_bytes());
            bytes.extend_from_slice(&lock.expiration.to_be_bytes());
        }
        Ok(Self { bytes })
    }

    /// The keccak digest both parties sign.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        keccak256(&self.bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Convert a decimal token amount to integer base units.
///
/// Rejects negative amounts, amounts with more than [`AMOUNT_PRECISION`]
/// fractional digits, and amounts too large for 64 bits. Exactness over
/// convenience: a payload that silently rounded would sign a state the
/// counterparty never agreed to.
pub fn to_base_units(amount: Decimal) -> Result<u64> {
    if amount.is_sign_negative() {
        return Err(StatewireError::MalformedPayload {
            reason: format!("negative amount: {amount}"),
        });
    }
    let scale = Decimal::from(10u64.pow(AMOUNT_PRECISION));
    let scaled = amount
        .checked_mul(scale)
        .ok_or_else(|| StatewireError::MalformedPayload {
            reason: format!("amount overflow: {amount}"),
        })?;
    if !scaled.fract().is_zero() {
        return Err(StatewireError::MalformedPayload {
            reason: format!("amount {amount} exceeds {AMOUNT_PRECISION} decimal places"),
        });
    }
    scaled
        .to_u64()
        .ok_or_else(|| StatewireError::MalformedPayload {
            reason: format!("amount {amount} does not fit 64-bit base units"),
        })
}

/// Inverse of [`to_base_units`]: interpret a contract-reported integer
/// as a token amount.
#[must_use]
pub fn from_base_units(units: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(units), AMOUNT_PRECISION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64, scale: u32) -> Decimal {
        Decimal::new(n, scale)
    }

    fn sample_channel() -> Channel {
        Channel::open(
            Address([1u8; 20]),
            Address([2u8; 20]),
            "TNC",
            dec(60, 0),
            dec(40, 0),
        )
    }

    #[test]
    fn base_units_conversion() {
        assert_eq!(to_base_units(dec(1, 0)).unwrap(), 100_000_000);
        assert_eq!(to_base_units(dec(25, 1)).unwrap(), 250_000_000); // 2.5
        assert_eq!(to_base_units(Decimal::ZERO).unwrap(), 0);
    }

    #[test]
    fn base_units_rejects_excess_precision() {
        // 9 fractional digits cannot be represented exactly.
        let err = to_base_units(dec(1, 9)).unwrap_err();
        assert!(format!("{err}").contains("SW_ERR_301"));
    }

    #[test]
    fn base_units_invert() {
        assert_eq!(from_base_units(2_550_000_000), dec(255, 1));
        assert_eq!(to_base_units(from_base_units(1)).unwrap(), 1);
    }

    #[test]
    fn base_units_rejects_negative() {
        assert!(to_base_units(dec(-5, 0)).is_err());
    }

    #[test]
    fn encoding_is_deterministic() {
        let ch = sample_channel();
        let a = StatePayload::from_channel(&ch).unwrap();
        let b = StatePayload::from_channel(&ch).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn nonce_changes_digest() {
        let mut ch = sample_channel();
        let before = StatePayload::from_channel(&ch).unwrap().digest();
        ch.nonce += 1;
        let after = StatePayload::from_channel(&ch).unwrap().digest();
        assert_ne!(before, after);
    }

    #[test]
    fn balances_change_digest() {
        let mut ch = sample_channel();
        let before = StatePayload::from_channel(&ch).unwrap().digest();
        ch.balances.debit(ch.founder, dec(10, 0)).unwrap();
        ch.balances.credit(ch.partner, dec(10, 0));
        let after = StatePayload::from_channel(&ch).unwrap().digest();
        assert_ne!(before, after);
    }

    #[test]
    fn pending_lock_extends_encoding() {
        let mut ch = sample_channel();
        let without = StatePayload::from_channel(&ch).unwrap();
        assert_eq!(without.as_bytes().len(), 96);

        let secret = statewire_types::Secret::from_bytes([3u8; 32]);
        let lock = HtlcLock::new(secret.lock_hash(), dec(10, 0), ch.founder, ch.partner, 500);
        ch.balances.debit(ch.founder, dec(10, 0)).unwrap();
        ch.locks.insert(lock.lock_hash, lock);
        let with = StatePayload::from_channel(&ch).unwrap();
        assert_eq!(with.as_bytes().len(), 96 + 88);
        assert_ne!(without.digest(), with.digest());
    }

    #[test]
    fn resolved_lock_drops_out_of_encoding() {
        let mut ch = sample_channel();
        let secret = statewire_types::Secret::from_bytes([3u8; 32]);
        let mut lock = HtlcLock::new(secret.lock_hash(), dec(10, 0), ch.founder, ch.partner, 500);
        lock.secret = Some(secret);
        ch.locks.insert(lock.lock_hash, lock);
        // A revealed lock is no longer pending, so the payload is bare.
        let payload = StatePayload::from_channel(&ch).unwrap();
        assert_eq!(payload.as_bytes().len(), 96);
    }
}
