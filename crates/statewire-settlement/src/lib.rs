//! # statewire-settlement
//!
//! The bridge between off-chain channel state and the on-chain
//! settlement contract. The [`reconciler`] decides *which* contract call
//! a channel event requires, the [`ledger`] trait abstracts *how* calls
//! reach the chain, and the [`outbox`] guarantees each (channel, nonce,
//! operation) triple is submitted at most once no matter how often the
//! surrounding machinery retries.

pub mod contract;
pub mod ledger;
pub mod outbox;
pub mod reconciler;

pub use contract::ContractCall;
pub use ledger::{CallOutcome, ChannelInfo, LedgerClient, TxStatus};
pub use outbox::{OperationKind, SettlementOutbox};
pub use reconciler::SettlementReconciler;
