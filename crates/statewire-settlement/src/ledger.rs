//! The external ledger client abstraction.
//!
//! Everything the reconciler knows about the chain goes through
//! [`LedgerClient`]: submitting contract calls, polling receipts, and
//! reading the current height. Production embedders wrap their node RPC
//! behind this trait; tests use an in-memory fake.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use statewire_types::constants::{LEDGER_MAX_SUBMIT_ATTEMPTS, LEDGER_RETRY_BACKOFF_MS};
use statewire_types::ids::BlockHeight;
use statewire_types::{Address, ChannelId, Result, StatewireError, TxId};

use crate::contract::ContractCall;

/// Confirmation status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Submitted but not yet included.
    Pending,
    /// Included at `height`.
    Confirmed { height: BlockHeight },
    /// Rejected by the contract or dropped by the chain.
    Failed { reason: String },
}

/// Structured outcome of a submission: the transaction id when the node
/// accepted the call, plus a human-readable status line either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub tx_data: Option<TxId>,
    pub tx_message: String,
}

impl CallOutcome {
    #[must_use]
    pub fn accepted(tx: TxId) -> Self {
        Self {
            tx_data: Some(tx),
            tx_message: "success".into(),
        }
    }
}

/// The settlement contract's mirror of a channel. Amounts are integer
/// base units, exactly as the contract stores them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_id: ChannelId,
    pub founder: Address,
    pub partner: Address,
    pub nonce: u64,
    pub total_deposit: u64,
}

/// Client for the chain hosting the settlement contract.
pub trait LedgerClient {
    /// Submit a contract call. A returned `Ok` means the node accepted
    /// the transaction, not that it confirmed.
    fn submit(&self, call: &ContractCall) -> Result<CallOutcome>;

    /// Confirmation status of a previously submitted transaction.
    fn receipt(&self, tx: &TxId) -> Result<TxStatus>;

    /// Current chain height. Dispute deadlines and lock expirations are
    /// judged against this.
    fn block_height(&self) -> Result<BlockHeight>;

    /// Number of channels the contract tracks.
    fn channel_count(&self) -> Result<u64>;

    /// The contract's record of `channel_id`, if it knows one.
    fn channel_info(&self, channel_id: &ChannelId) -> Result<Option<ChannelInfo>>;

    /// Total collateral the contract holds for `channel_id`, in base
    /// units. The local deposit total must always reconcile with this.
    fn channel_balance(&self, channel_id: &ChannelId) -> Result<u64>;
}

/// Submit `call` with bounded retries and linear backoff.
///
/// Transient node failures are retried up to
/// [`LEDGER_MAX_SUBMIT_ATTEMPTS`] times; the last error is surfaced as
/// [`StatewireError::LedgerCallFailed`].
pub fn submit_with_retry<L: LedgerClient>(ledger: &L, call: &ContractCall) -> Result<CallOutcome> {
    let mut last_reason = String::new();
    for attempt in 1..=LEDGER_MAX_SUBMIT_ATTEMPTS {
        match ledger.submit(call) {
            Ok(outcome) => return Ok(outcome),
            Err(err) => {
                last_reason = err.to_string();
                warn!(
                    call = call.name(),
                    attempt,
                    max = LEDGER_MAX_SUBMIT_ATTEMPTS,
                    error = %err,
                    "ledger submission failed"
                );
                if attempt < LEDGER_MAX_SUBMIT_ATTEMPTS {
                    std::thread::sleep(Duration::from_millis(
                        LEDGER_RETRY_BACKOFF_MS * u64::from(attempt),
                    ));
                }
            }
        }
    }
    Err(StatewireError::LedgerCallFailed {
        call: call.name().into(),
        reason: last_reason,
    })
}
