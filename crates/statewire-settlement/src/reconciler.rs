//! The settlement reconciler.
//!
//! Turns channel events into settlement-contract calls and mirrors
//! confirmed on-chain outcomes back into the channel lifecycle. Every
//! method takes `&mut Channel` and is called with the channel's mutex
//! held; cross-cutting dedup lives in the shared [`SettlementOutbox`].
//!
//! Duplicate triggers are everywhere in this layer (confirmations are
//! delivered at least once, pollers fire every block), so each entry
//! point is idempotent: a repeat returns `Ok(None)` instead of
//! resubmitting, and a settlement confirmation for an already-settled
//! channel is a success, not an error.

use std::sync::Mutex;

use rust_decimal::Decimal;
use tracing::{debug, info};

use statewire_channel::lifecycle;
use statewire_crypto::payload::from_base_units;
use statewire_types::constants::OUTBOX_CACHE_SIZE;
use statewire_types::{
    BalanceSheet, Channel, ChannelId, ChannelState, HtlcLock, NodeConfig, Result, Secret,
    StatewireError,
};

use crate::contract::ContractCall;
use crate::ledger::{submit_with_retry, CallOutcome, LedgerClient, TxStatus};
use crate::outbox::{OperationKind, SettlementOutbox};

/// Drives on-chain settlement for all local channels.
pub struct SettlementReconciler<L: LedgerClient> {
    ledger: L,
    outbox: Mutex<SettlementOutbox>,
    config: NodeConfig,
}

impl<L: LedgerClient> SettlementReconciler<L> {
    #[must_use]
    pub fn new(ledger: L, config: NodeConfig) -> Self {
        Self {
            ledger,
            outbox: Mutex::new(SettlementOutbox::new(OUTBOX_CACHE_SIZE)),
            config,
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Submit `call` unless this (channel, nonce, operation) was already
    /// submitted. `Ok(None)` means deduplicated.
    fn submit_once(
        &self,
        channel_id: ChannelId,
        nonce: u64,
        kind: OperationKind,
        call: &ContractCall,
    ) -> Result<Option<CallOutcome>> {
        {
            let outbox = self.outbox.lock().unwrap();
            if outbox.is_submitted(&channel_id, nonce, kind) {
                debug!(channel = %channel_id, nonce, ?kind, "duplicate submission skipped");
                return Ok(None);
            }
        }
        let outcome = submit_with_retry(&self.ledger, call)?;
        self.outbox
            .lock()
            .unwrap()
            .mark_submitted(channel_id, nonce, kind)?;
        info!(
            channel = %channel_id,
            call = call.name(),
            tx = ?outcome.tx_data,
            "submitted settlement call"
        );
        Ok(Some(outcome))
    }

    /// Submit the funding deposit for a channel awaiting confirmation.
    pub fn fund(&self, channel: &mut Channel) -> Result<Option<CallOutcome>> {
        if channel.state != ChannelState::Init {
            return Err(StatewireError::InvalidTransition {
                from: channel.state,
                to: ChannelState::Opened,
            });
        }
        self.config
            .validate_deposit(&channel.asset_type, channel.deposits.get(&channel.founder))?;
        self.config
            .validate_deposit(&channel.asset_type, channel.deposits.get(&channel.partner))?;
        let call = ContractCall::deposit_for(channel)?;
        self.submit_once(channel.channel_id, channel.nonce, OperationKind::Deposit, &call)
    }

    /// Deposit confirmed on-chain: the channel opens. A repeated
    /// confirmation is a no-op.
    pub fn confirm_deposit(&self, channel: &mut Channel) -> Result<()> {
        if channel.state == ChannelState::Opened {
            return Ok(());
        }
        lifecycle::mark_opened(channel)
    }

    /// Poll the funding transaction's receipt and open the channel once
    /// it confirms. Returns whether the channel is open.
    pub fn track_deposit(&self, channel: &mut Channel, tx: &statewire_types::TxId) -> Result<bool> {
        match self.ledger.receipt(tx)? {
            TxStatus::Confirmed { .. } => {
                self.confirm_deposit(channel)?;
                Ok(true)
            }
            TxStatus::Pending => Ok(false),
            TxStatus::Failed { reason } => Err(StatewireError::LedgerCallFailed {
                call: "deposit".into(),
                reason,
            }),
        }
    }

    /// Submit a collateral top-up for an open channel. The amounts are
    /// the additional deposits; each party's new total must stay within
    /// the configured bounds.
    pub fn top_up(
        &self,
        channel: &mut Channel,
        founder_add: Decimal,
        partner_add: Decimal,
    ) -> Result<Option<CallOutcome>> {
        if channel.state != ChannelState::Opened {
            return Err(StatewireError::ChannelNotOpen {
                state: channel.state,
            });
        }
        if founder_add.is_sign_negative() || partner_add.is_sign_negative() {
            return Err(StatewireError::MalformedPayload {
                reason: "negative top-up amount".into(),
            });
        }
        self.config.validate_deposit(
            &channel.asset_type,
            channel.deposits.get(&channel.founder) + founder_add,
        )?;
        self.config.validate_deposit(
            &channel.asset_type,
            channel.deposits.get(&channel.partner) + partner_add,
        )?;
        let call = ContractCall::update_deposit_for(channel, founder_add, partner_add)?;
        self.submit_once(channel.channel_id, channel.nonce, OperationKind::TopUp, &call)
    }

    /// Top-up confirmed on-chain: the added collateral lands in both
    /// the deposit and balance columns.
    pub fn confirm_top_up(
        &self,
        channel: &mut Channel,
        founder_add: Decimal,
        partner_add: Decimal,
    ) -> Result<()> {
        if channel.state != ChannelState::Opened {
            return Err(StatewireError::ChannelNotOpen {
                state: channel.state,
            });
        }
        channel.deposits.credit(channel.founder, founder_add);
        channel.deposits.credit(channel.partner, partner_add);
        channel.balances.credit(channel.founder, founder_add);
        channel.balances.credit(channel.partner, partner_add);
        info!(
            channel = %channel.channel_id,
            %founder_add,
            %partner_add,
            "collateral top-up applied"
        );
        Ok(())
    }

    /// Cooperative close at the current dual-signed state.
    pub fn quick_close(&self, channel: &mut Channel) -> Result<Option<CallOutcome>> {
        if channel.state != ChannelState::Opened {
            return Err(StatewireError::ChannelNotOpen {
                state: channel.state,
            });
        }
        let call = ContractCall::quick_close_for(channel)?;
        self.submit_once(
            channel.channel_id,
            channel.nonce,
            OperationKind::QuickClose,
            &call,
        )
    }

    /// Unilateral close at the last dual-signed state; starts the local
    /// view of the dispute window. Closing a channel that already
    /// settled reports [`StatewireError::AlreadySettled`], which
    /// callers treat as a no-op rather than a failure.
    pub fn unilateral_close(&self, channel: &mut Channel) -> Result<Option<CallOutcome>> {
        if channel.state.is_terminal() {
            return Err(StatewireError::AlreadySettled(channel.channel_id));
        }
        if channel.state != ChannelState::Opened {
            return Err(StatewireError::ChannelNotOpen {
                state: channel.state,
            });
        }
        let call = ContractCall::close_for(channel)?;
        let outcome = self.submit_once(
            channel.channel_id,
            channel.nonce,
            OperationKind::Close,
            &call,
        )?;
        if outcome.is_some() {
            let deadline = self.ledger.block_height()? + self.config.dispute_window_blocks;
            lifecycle::begin_close(channel, deadline)?;
        }
        Ok(outcome)
    }

    /// The counterparty closed on-chain claiming the state at
    /// `claimed_nonce`. If our last agreed state is strictly newer,
    /// challenge with it; either way the channel enters the dispute
    /// phase locally.
    pub fn handle_remote_close(
        &self,
        channel: &mut Channel,
        claimed_nonce: u64,
    ) -> Result<Option<CallOutcome>> {
        let deadline = self.ledger.block_height()? + self.config.dispute_window_blocks;
        if channel.state == ChannelState::Opened {
            lifecycle::begin_close(channel, deadline)?;
        }

        if claimed_nonce < channel.nonce && channel.is_agreed() {
            let call = ContractCall::challenge_for(channel)?;
            let outcome = self.submit_once(
                channel.channel_id,
                channel.nonce,
                OperationKind::Challenge,
                &call,
            )?;
            if outcome.is_some() {
                // Challenge accepted locally; the window restarts.
                let deadline =
                    self.ledger.block_height()? + self.config.dispute_window_blocks;
                lifecycle::challenge(channel, deadline)?;
            }
            return Ok(outcome);
        }

        debug!(
            channel = %channel.channel_id,
            claimed_nonce,
            local_nonce = channel.nonce,
            "remote close matches or exceeds local state; no challenge"
        );
        Ok(None)
    }

    /// The counterparty answered a pending close with an on-chain
    /// challenge. The contract has already accepted it, so if it
    /// carries a strictly newer state we adopt that state wholesale
    /// and restart the dispute window. An equal or older nonce keeps
    /// the local state and returns `false`.
    pub fn adopt_remote_challenge(
        &self,
        channel: &mut Channel,
        remote_nonce: u64,
        remote_balances: BalanceSheet,
        remote_lock: Option<HtlcLock>,
    ) -> Result<bool> {
        if remote_nonce <= channel.nonce {
            debug!(
                channel = %channel.channel_id,
                remote_nonce,
                local_nonce = channel.nonce,
                "remote challenge is not newer; keeping local state"
            );
            return Ok(false);
        }
        let deadline = self.ledger.block_height()? + self.config.dispute_window_blocks;
        if channel.state == ChannelState::Opened {
            lifecycle::begin_close(channel, deadline)?;
        }
        lifecycle::challenge(channel, deadline)?;
        info!(
            channel = %channel.channel_id,
            remote_nonce,
            local_nonce = channel.nonce,
            "adopting newer on-chain state"
        );
        channel.nonce = remote_nonce;
        channel.balances = remote_balances;
        channel.locks.clear();
        if let Some(lock) = remote_lock {
            channel.locks.insert(lock.lock_hash, lock);
        }
        Ok(true)
    }

    /// Finalize a pending close once the dispute window has elapsed.
    /// Returns `Ok(None)` while the window is still open.
    pub fn finalize(&self, channel: &mut Channel) -> Result<Option<CallOutcome>> {
        if !matches!(
            channel.state,
            ChannelState::Closing | ChannelState::Disputed
        ) {
            return Ok(None);
        }
        let Some(deadline) = channel.dispute_deadline else {
            return Ok(None);
        };
        if self.ledger.block_height()? <= deadline {
            return Ok(None);
        }

        let call = ContractCall::SettleTransaction {
            channel_id: channel.channel_id,
        };
        let outcome = self.submit_once(
            channel.channel_id,
            channel.nonce,
            OperationKind::Settle,
            &call,
        )?;
        if outcome.is_some() {
            self.confirm_settled(channel)?;
        }
        Ok(outcome)
    }

    /// Settlement confirmed on-chain. Repeated confirmations are
    /// successes: the terminal state is already the truth.
    pub fn confirm_settled(&self, channel: &mut Channel) -> Result<()> {
        match lifecycle::mark_settled(channel) {
            Err(StatewireError::AlreadySettled(_)) => Ok(()),
            other => other,
        }
    }

    /// Redeem the channel's pending lock on-chain with its secret. The
    /// path of last resort when the cooperative reveal went unanswered.
    pub fn redeem_lock(&self, channel: &mut Channel, secret: Secret) -> Result<Option<CallOutcome>> {
        let call = ContractCall::withdraw_for(channel, secret)?;
        self.submit_once(
            channel.channel_id,
            channel.nonce,
            OperationKind::WithdrawLock,
            &call,
        )
    }

    /// Reclaim an expired, unredeemed lock on-chain.
    pub fn reclaim_expired_lock(&self, channel: &mut Channel) -> Result<Option<CallOutcome>> {
        let lock = channel
            .pending_lock()
            .ok_or_else(|| StatewireError::Internal("no pending lock to reclaim".into()))?;
        let height = self.ledger.block_height()?;
        if !lock.is_expired(height) {
            return Err(StatewireError::LockNotExpired {
                expiration: lock.expiration,
                height,
            });
        }
        let call = ContractCall::WithdrawSettle {
            channel_id: channel.channel_id,
            lock_hash: lock.lock_hash,
        };
        self.submit_once(
            channel.channel_id,
            channel.nonce,
            OperationKind::WithdrawLock,
            &call,
        )
    }

    /// Withdraw current dual-signed balances without closing.
    pub fn withdraw_balance(&self, channel: &mut Channel) -> Result<Option<CallOutcome>> {
        if channel.state != ChannelState::Opened {
            return Err(StatewireError::ChannelNotOpen {
                state: channel.state,
            });
        }
        let call = ContractCall::withdraw_balance_for(channel)?;
        self.submit_once(
            channel.channel_id,
            channel.nonce,
            OperationKind::WithdrawBalance,
            &call,
        )
    }

    /// The `withdrawBalance` transaction confirmed: the withdrawn
    /// amounts leave the balance columns and the recorded collateral
    /// rebases to the remaining claims, so the local record keeps
    /// matching what the contract still holds. The channel stays open.
    pub fn confirm_withdraw_balance(
        &self,
        channel: &mut Channel,
        founder_amount: Decimal,
        partner_amount: Decimal,
    ) -> Result<()> {
        if channel.state != ChannelState::Opened {
            return Err(StatewireError::ChannelNotOpen {
                state: channel.state,
            });
        }
        // All-or-nothing: check both debits before applying either.
        for (party, amount) in [
            (channel.founder, founder_amount),
            (channel.partner, partner_amount),
        ] {
            let available = channel.balances.get(&party);
            if amount > available {
                return Err(StatewireError::InsufficientBalance {
                    needed: amount,
                    available,
                });
            }
        }
        channel.balances.debit(channel.founder, founder_amount)?;
        channel.balances.debit(channel.partner, partner_amount)?;
        for party in [channel.founder, channel.partner] {
            let locked: Decimal = channel
                .locks
                .values()
                .filter(|l| l.secret.is_none() && l.sender == party)
                .map(|l| l.amount)
                .sum();
            channel.deposits.set(party, channel.balances.get(&party) + locked);
        }
        info!(
            channel = %channel.channel_id,
            %founder_amount,
            %partner_amount,
            "withdrawal applied to record"
        );
        Ok(())
    }

    /// Compare the contract's collateral for this channel against the
    /// local deposit total. A mismatch means the two records have
    /// silently diverged and the channel needs operator attention.
    pub fn audit_collateral(&self, channel: &Channel) -> Result<()> {
        let onchain = from_base_units(self.ledger.channel_balance(&channel.channel_id)?);
        let local = channel.total_deposit();
        if onchain != local {
            return Err(StatewireError::ConservationViolation {
                expected: local,
                actual: onchain,
            });
        }
        Ok(())
    }

    /// Deposits released on-chain; the record becomes terminal.
    pub fn release(&self, channel: &mut Channel) -> Result<()> {
        lifecycle::mark_closed(channel)
    }

    /// Force a unilateral close if the counterparty has been silent
    /// longer than the configured liveness timeout. `Ok(None)` while the
    /// peer is still within bounds.
    pub fn check_liveness(&self, channel: &mut Channel) -> Result<Option<CallOutcome>> {
        if channel.state != ChannelState::Opened
            || !channel.peer_silent_for(self.config.liveness_timeout_secs)
        {
            return Ok(None);
        }
        info!(
            channel = %channel.channel_id,
            timeout_secs = self.config.liveness_timeout_secs,
            "counterparty silent past liveness timeout; closing unilaterally"
        );
        self.unilateral_close(channel)
    }

    /// One reconciliation step for a channel: finalize an elapsed
    /// dispute window, or reclaim an expired lock. Meant to be called
    /// for every channel on each new block.
    pub fn poll(&self, channel: &mut Channel) -> Result<Option<CallOutcome>> {
        match channel.state {
            ChannelState::Closing | ChannelState::Disputed => self.finalize(channel),
            ChannelState::Opened => {
                let height = self.ledger.block_height()?;
                let expired = channel
                    .pending_lock()
                    .is_some_and(|lock| lock.is_expired(height));
                if expired {
                    self.reclaim_expired_lock(channel)
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }
}
