//! Settlement outbox — at-most-once submission per channel operation.
//!
//! Confirmations and triggers arrive at least once, sometimes more, so
//! every on-chain submission is keyed by `(channel, nonce, operation)`
//! and checked here first. A key seen before is a duplicate delivery,
//! reported as [`StatewireError::AlreadyApplied`] and treated by the
//! reconciler as a no-op success.
//!
//! The outbox keeps an LRU-style bounded set so memory stays predictable
//! in long-running nodes.

use std::collections::{HashSet, VecDeque};

use statewire_types::{ChannelId, Result, StatewireError};

/// The settlement operation a submission belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Deposit,
    TopUp,
    QuickClose,
    Close,
    Challenge,
    Settle,
    WithdrawLock,
    WithdrawBalance,
}

type OutboxKey = (ChannelId, u64, OperationKind);

/// Bounded dedup set over settlement submissions.
pub struct SettlementOutbox {
    submitted: HashSet<OutboxKey>,
    /// Insertion order for LRU eviction (front = oldest).
    order: VecDeque<OutboxKey>,
    max_size: usize,
}

impl SettlementOutbox {
    /// # Panics
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "SettlementOutbox max_size must be > 0");
        Self {
            submitted: HashSet::with_capacity(max_size),
            order: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Record a submission. A repeated key is a duplicate delivery and
    /// returns [`StatewireError::AlreadyApplied`].
    pub fn mark_submitted(
        &mut self,
        channel: ChannelId,
        nonce: u64,
        kind: OperationKind,
    ) -> Result<()> {
        let key = (channel, nonce, kind);
        if self.submitted.contains(&key) {
            return Err(StatewireError::AlreadyApplied { nonce });
        }

        if self.submitted.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.submitted.remove(&oldest);
            }
        }

        self.submitted.insert(key);
        self.order.push_back(key);
        Ok(())
    }

    /// Whether this exact submission has been recorded.
    #[must_use]
    pub fn is_submitted(&self, channel: &ChannelId, nonce: u64, kind: OperationKind) -> bool {
        self.submitted.contains(&(*channel, nonce, kind))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.submitted.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.submitted.is_empty()
    }
}
