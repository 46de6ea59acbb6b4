//! Signed state proposals.
//!
//! A proposal is an immutable, transient message carrying the *entire*
//! next channel state (balances and locks) plus the sender's signature
//! over its canonical encoding. It is never persisted: once
//! counter-signed it is folded into the [`Channel`](crate::Channel)
//! record and discarded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::balance::BalanceSheet;
use crate::ids::{Address, ChannelId, Signature};
use crate::lock::{HtlcLock, LockHash};

/// A proposed next state for a channel, signed by its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedProposal {
    /// The channel this proposal targets.
    pub channel_id: ChannelId,
    /// Must be exactly `current.nonce + 1`; gaps and repeats are rejected.
    pub nonce: u64,
    /// Full replacement balance sheet for both parties.
    pub balances: BalanceSheet,
    /// Full replacement lock set.
    pub locks: BTreeMap<LockHash, HtlcLock>,
    /// The party proposing the state.
    pub sender: Address,
    /// The sender's signature over the canonical encoding of
    /// `(channel_id, nonce, balances, locks)`.
    pub signature: Signature,
}

impl SignedProposal {
    /// The single unresolved lock carried by this proposal, if any.
    #[must_use]
    pub fn pending_lock(&self) -> Option<&HtlcLock> {
        self.locks.values().find(|l| l.secret.is_none())
    }
}
