//! Error types for the statewire payment-channel core.
//!
//! All errors use the `SW_ERR_` prefix convention for easy grepping in
//! logs. Error codes are grouped by subsystem:
//! - 1xx: Channel lifecycle errors
//! - 2xx: Balance / conservation errors
//! - 3xx: Signature / payload errors
//! - 4xx: HTLC errors
//! - 5xx: Proposal ordering errors
//! - 6xx: Ledger / settlement errors
//! - 7xx: Gateway errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::channel::ChannelState;
use crate::ids::{Address, ChannelId};
use crate::lock::LockHash;

/// Central error enum for all statewire operations.
#[derive(Debug, Error)]
pub enum StatewireError {
    // =================================================================
    // Channel Lifecycle Errors (1xx)
    // =================================================================
    /// No channel with this id is known locally.
    #[error("SW_ERR_100: Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    /// A channel between these parties already exists.
    #[error("SW_ERR_101: Channel already exists between {founder} and {partner}")]
    ChannelExists { founder: Address, partner: Address },

    /// The requested lifecycle transition is not allowed.
    #[error("SW_ERR_102: Invalid channel transition: {from} -> {to}")]
    InvalidTransition {
        from: ChannelState,
        to: ChannelState,
    },

    /// The channel already reached a terminal settlement state.
    /// Callers treat this as an idempotent no-op, not a failure.
    #[error("SW_ERR_103: Channel already settled: {0}")]
    AlreadySettled(ChannelId),

    /// An off-chain update was attempted outside the OPENED state.
    #[error("SW_ERR_104: Channel not open for updates (state: {state})")]
    ChannelNotOpen { state: ChannelState },

    // =================================================================
    // Balance Errors (2xx)
    // =================================================================
    /// Not enough free balance to perform the operation.
    #[error("SW_ERR_200: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// Balances plus locked amounts no longer conserve total deposit.
    #[error("SW_ERR_201: Conservation violation: deposits total {expected}, balances+locks total {actual}")]
    ConservationViolation { expected: Decimal, actual: Decimal },

    /// A proposal would leave a party with a negative balance.
    #[error("SW_ERR_202: Negative balance for party {party}")]
    NegativeBalance { party: Address },

    /// An address that is neither founder nor partner of the channel.
    #[error("SW_ERR_203: Unknown party: {0}")]
    UnknownParty(Address),

    /// A deposit outside the configured per-asset bounds.
    #[error("SW_ERR_204: Deposit {amount} outside allowed range [{min}, {max}]")]
    DepositOutOfRange {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    // =================================================================
    // Signature / Payload Errors (3xx)
    // =================================================================
    /// Signature recovery failed or recovered an unexpected signer.
    /// Never retried blindly — reported to the operator.
    #[error("SW_ERR_300: Invalid signature: {reason}")]
    InvalidSignature { reason: String },

    /// The canonical signable payload could not be constructed
    /// (amount overflow, excess precision, negative amount).
    #[error("SW_ERR_301: Malformed payload: {reason}")]
    MalformedPayload { reason: String },

    // =================================================================
    // HTLC Errors (4xx)
    // =================================================================
    /// A revealed secret does not hash to the lock hash.
    #[error("SW_ERR_400: HTLC secret does not match lock hash")]
    SecretMismatch,

    /// No lock with this hash exists on the channel.
    #[error("SW_ERR_401: HTLC lock not found: {0}")]
    LockNotFound(LockHash),

    /// Reclaim attempted before the lock's expiration height.
    #[error("SW_ERR_402: HTLC lock not expired: expires at {expiration}, ledger height {height}")]
    LockNotExpired { expiration: u64, height: u64 },

    /// A new lock's expiration does not comfortably clear the dispute
    /// window.
    #[error("SW_ERR_403: HTLC expiration {expiration} too soon; must exceed {min_expiration}")]
    LockExpiresTooSoon {
        expiration: u64,
        min_expiration: u64,
    },

    /// A lock is already pending; the contract resolves one at a time.
    #[error("SW_ERR_404: An HTLC lock is already pending: {0}")]
    LockAlreadyPending(LockHash),

    // =================================================================
    // Proposal Ordering Errors (5xx)
    // =================================================================
    /// Proposal nonce is not exactly `current + 1`. Recoverable: the
    /// sender must resynchronize from the last agreed state.
    #[error("SW_ERR_500: Stale proposal: expected nonce {expected}, got {got}")]
    StaleProposal { expected: u64, got: u64 },

    /// A duplicate delivery of an already-applied update. Idempotent
    /// no-op, not surfaced as failure.
    #[error("SW_ERR_501: Update already applied at nonce {nonce}")]
    AlreadyApplied { nonce: u64 },

    // =================================================================
    // Ledger / Settlement Errors (6xx)
    // =================================================================
    /// The external ledger client failed to submit or confirm a call,
    /// after bounded retries.
    #[error("SW_ERR_600: Ledger call failed: {call}: {reason}")]
    LedgerCallFailed { call: String, reason: String },

    // =================================================================
    // Gateway Errors (7xx)
    // =================================================================
    /// The gateway relay could not be reached.
    #[error("SW_ERR_700: Gateway unreachable: {reason}")]
    GatewayUnreachable { reason: String },

    /// An inbound message did not match any expected shape.
    #[error("SW_ERR_701: Malformed gateway message: {reason}")]
    MalformedMessage { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("SW_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("SW_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (missing asset, bad address, etc.).
    #[error("SW_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, StatewireError>;

impl From<serde_json::Error> for StatewireError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
