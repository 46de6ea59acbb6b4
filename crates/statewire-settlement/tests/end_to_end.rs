//! End-to-end settlement flows: cooperative close, HTLC resolution with
//! on-chain fallback, and dispute arbitration where the newest
//! dual-signed state wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rust_decimal::Decimal;

use statewire_channel::{
    commit_proposal, countersign, propose_lock, propose_reveal, propose_transfer,
    validate_proposal,
};
use statewire_crypto::{KeyPair, Signer};
use statewire_settlement::{
    CallOutcome, ChannelInfo, ContractCall, LedgerClient, SettlementReconciler, TxStatus,
};
use statewire_types::ids::BlockHeight;
use statewire_types::{
    BalanceSheet, Channel, ChannelId, ChannelState, NodeConfig, Result, Secret, StatewireError,
    TxId,
};

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

/// In-memory ledger: records every accepted call and exposes a
/// controllable block height.
#[derive(Default)]
struct FakeLedger {
    height: AtomicU64,
    calls: Mutex<Vec<ContractCall>>,
}

impl FakeLedger {
    fn advance_to(&self, height: BlockHeight) {
        self.height.store(height, Ordering::SeqCst);
    }

    fn submitted_names(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(ContractCall::name).collect()
    }
}

impl LedgerClient for FakeLedger {
    fn submit(&self, call: &ContractCall) -> Result<CallOutcome> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call.clone());
        Ok(CallOutcome::accepted(TxId::new(format!("0x{:04x}", calls.len()))))
    }

    fn receipt(&self, _tx: &TxId) -> Result<TxStatus> {
        Ok(TxStatus::Confirmed {
            height: self.height.load(Ordering::SeqCst),
        })
    }

    fn block_height(&self) -> Result<BlockHeight> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    fn channel_count(&self) -> Result<u64> {
        let calls = self.calls.lock().unwrap();
        let mut ids: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                ContractCall::Deposit { channel_id, .. } => Some(*channel_id),
                _ => None,
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids.len() as u64)
    }

    fn channel_info(&self, channel_id: &ChannelId) -> Result<Option<ChannelInfo>> {
        let calls = self.calls.lock().unwrap();
        let info = calls.iter().rev().find_map(|c| match c {
            ContractCall::Deposit {
                channel_id: id,
                nonce,
                founder,
                founder_amount,
                partner,
                partner_amount,
                ..
            } if id == channel_id => Some(ChannelInfo {
                channel_id: *id,
                founder: *founder,
                partner: *partner,
                nonce: *nonce,
                total_deposit: founder_amount + partner_amount,
            }),
            _ => None,
        });
        Ok(info)
    }

    fn channel_balance(&self, channel_id: &ChannelId) -> Result<u64> {
        let calls = self.calls.lock().unwrap();
        let total = calls
            .iter()
            .map(|c| match c {
                ContractCall::Deposit {
                    channel_id: id,
                    founder_amount,
                    partner_amount,
                    ..
                }
                | ContractCall::UpdateDeposit {
                    channel_id: id,
                    founder_amount,
                    partner_amount,
                    ..
                } if id == channel_id => founder_amount + partner_amount,
                _ => 0,
            })
            .sum();
        Ok(total)
    }
}

struct Harness {
    founder: KeyPair,
    partner: KeyPair,
    channel: Channel,
    reconciler: SettlementReconciler<FakeLedger>,
    config: NodeConfig,
}

impl Harness {
    /// A funded, opened, dual-signed channel with 100/100 deposits.
    fn opened() -> Self {
        let founder = KeyPair::generate();
        let partner = KeyPair::generate();
        let mut channel = Channel::open(
            founder.address(),
            partner.address(),
            "TNC",
            dec(100),
            dec(100),
        );
        countersign(&mut channel, &founder).unwrap();
        countersign(&mut channel, &partner).unwrap();

        let config = NodeConfig::default();
        let reconciler = SettlementReconciler::new(FakeLedger::default(), config.clone());
        reconciler.fund(&mut channel).unwrap().unwrap();
        reconciler.confirm_deposit(&mut channel).unwrap();
        assert_eq!(channel.state, ChannelState::Opened);

        Self {
            founder,
            partner,
            channel,
            reconciler,
            config,
        }
    }

    fn height(&self) -> BlockHeight {
        self.reconciler.ledger().block_height().unwrap()
    }

    /// Full dual-signed round trip of one proposal from `signer`.
    fn apply_signed(&mut self, proposal: statewire_types::SignedProposal, countersigner: &KeyPair) {
        let height = self.height();
        validate_proposal(&self.channel, &proposal, &self.config, height).unwrap();
        commit_proposal(&mut self.channel, proposal).unwrap();
        countersign(&mut self.channel, countersigner).unwrap();
        assert!(self.channel.is_agreed());
        assert!(self.channel.conservation_holds());
    }
}

#[test]
fn cooperative_lifecycle_settles_final_balances() {
    let mut h = Harness::opened();

    // Two payments founder -> partner, each fully dual-signed.
    let p1 = propose_transfer(&h.channel, &h.founder, dec(30)).unwrap();
    h.apply_signed(p1, &h.partner.clone());
    let p2 = propose_transfer(&h.channel, &h.founder, dec(20)).unwrap();
    h.apply_signed(p2, &h.partner.clone());

    assert_eq!(h.channel.nonce, 2);
    assert_eq!(h.channel.free_balance(&h.founder.address()), dec(50));
    assert_eq!(h.channel.free_balance(&h.partner.address()), dec(150));

    // Cooperative close at the agreed state.
    h.reconciler.quick_close(&mut h.channel).unwrap().unwrap();
    h.reconciler.confirm_settled(&mut h.channel).unwrap();
    assert_eq!(h.channel.state, ChannelState::Settled);

    // A late unilateral close on the settled channel is reported as
    // already settled, not treated as a new close.
    assert!(matches!(
        h.reconciler.unilateral_close(&mut h.channel),
        Err(StatewireError::AlreadySettled(_))
    ));

    h.reconciler.release(&mut h.channel).unwrap();
    assert_eq!(h.channel.state, ChannelState::Closed);

    assert_eq!(
        h.reconciler.ledger().submitted_names(),
        vec!["deposit", "quickCloseChannel"]
    );
}

#[test]
fn withdrawal_keeps_channel_open_and_rebases_collateral() {
    let mut h = Harness::opened();
    let p1 = propose_transfer(&h.channel, &h.founder, dec(30)).unwrap();
    h.apply_signed(p1, &h.partner.clone());

    assert!(h.reconciler.withdraw_balance(&mut h.channel).unwrap().is_some());
    assert!(h.reconciler.ledger().submitted_names().contains(&"withdrawBalance"));

    // Both parties take out part of their agreed balances; the record
    // follows the confirmed on-chain movement.
    h.reconciler
        .confirm_withdraw_balance(&mut h.channel, dec(50), dec(100))
        .unwrap();
    assert_eq!(h.channel.state, ChannelState::Opened);
    assert_eq!(h.channel.free_balance(&h.founder.address()), dec(20));
    assert_eq!(h.channel.free_balance(&h.partner.address()), dec(30));
    assert_eq!(h.channel.total_deposit(), dec(50));
    assert!(h.channel.conservation_holds());

    // Withdrawing more than a party holds is rejected whole.
    let before = h.channel.balances.clone();
    let err = h
        .reconciler
        .confirm_withdraw_balance(&mut h.channel, dec(25), dec(31))
        .unwrap_err();
    assert!(matches!(err, StatewireError::InsufficientBalance { .. }));
    assert_eq!(h.channel.balances, before);
}

#[test]
fn deposit_top_up_reaches_contract_and_record() {
    let mut h = Harness::opened();

    assert!(h.reconciler.top_up(&mut h.channel, dec(25), dec(0)).unwrap().is_some());
    assert!(h.reconciler.ledger().submitted_names().contains(&"updateDeposit"));
    // Same (channel, nonce, operation): deduplicated.
    assert!(h.reconciler.top_up(&mut h.channel, dec(25), dec(0)).unwrap().is_none());

    h.reconciler.confirm_top_up(&mut h.channel, dec(25), dec(0)).unwrap();
    assert_eq!(h.channel.total_deposit(), dec(225));
    assert_eq!(h.channel.free_balance(&h.founder.address()), dec(125));
    assert!(h.channel.conservation_holds());

    // The contract saw the same top-up, so the mirrors agree.
    h.reconciler.audit_collateral(&h.channel).unwrap();
}

#[test]
fn onchain_mirror_matches_local_record() {
    let h = Harness::opened();
    let ledger = h.reconciler.ledger();

    assert_eq!(ledger.channel_count().unwrap(), 1);
    let info = ledger.channel_info(&h.channel.channel_id).unwrap().unwrap();
    assert_eq!(info.founder, h.founder.address());
    assert_eq!(info.partner, h.partner.address());
    assert_eq!(info.total_deposit, 200 * 100_000_000);
    assert_eq!(
        ledger.channel_balance(&h.channel.channel_id).unwrap(),
        info.total_deposit
    );
    h.reconciler.audit_collateral(&h.channel).unwrap();

    assert_eq!(ledger.channel_info(&ChannelId::from_bytes([9u8; 32])).unwrap(), None);
}

#[test]
fn quick_close_is_submitted_at_most_once() {
    let mut h = Harness::opened();
    assert!(h.reconciler.quick_close(&mut h.channel).unwrap().is_some());
    // Same (channel, nonce, operation): deduplicated, not resubmitted.
    assert!(h.reconciler.quick_close(&mut h.channel).unwrap().is_none());
    assert_eq!(
        h.reconciler.ledger().submitted_names(),
        vec!["deposit", "quickCloseChannel"]
    );
}

#[test]
fn repeated_settlement_confirmations_are_noops() {
    let mut h = Harness::opened();
    h.reconciler.quick_close(&mut h.channel).unwrap();
    h.reconciler.confirm_settled(&mut h.channel).unwrap();
    // At-least-once delivery: further confirmations succeed silently.
    h.reconciler.confirm_settled(&mut h.channel).unwrap();
    h.reconciler.confirm_settled(&mut h.channel).unwrap();
    assert_eq!(h.channel.state, ChannelState::Settled);
}

#[test]
fn htlc_reveal_then_cooperative_close() {
    let mut h = Harness::opened();
    let secret = Secret::generate();
    let expiration = h.config.min_lock_expiration(h.height()) + 50;

    let lock = propose_lock(
        &h.channel,
        &h.founder,
        secret.lock_hash(),
        dec(25),
        expiration,
        &h.config,
        h.height(),
    )
    .unwrap();
    h.apply_signed(lock, &h.partner.clone());
    assert_eq!(h.channel.locked_total(), dec(25));

    let reveal = propose_reveal(&h.channel, &h.partner, secret).unwrap();
    h.apply_signed(reveal, &h.founder.clone());
    assert_eq!(h.channel.free_balance(&h.partner.address()), dec(125));
    assert_eq!(h.channel.locked_total(), dec(0));

    h.reconciler.quick_close(&mut h.channel).unwrap().unwrap();
    h.reconciler.confirm_settled(&mut h.channel).unwrap();
    assert_eq!(h.channel.state, ChannelState::Settled);
}

#[test]
fn htlc_on_chain_redemption_fallback() {
    let mut h = Harness::opened();
    let secret = Secret::generate();
    let expiration = h.config.min_lock_expiration(h.height()) + 50;

    let lock = propose_lock(
        &h.channel,
        &h.founder,
        secret.lock_hash(),
        dec(25),
        expiration,
        &h.config,
        h.height(),
    )
    .unwrap();
    h.apply_signed(lock, &h.partner.clone());

    // The cooperative reveal went unanswered: redeem on-chain instead.
    h.reconciler.redeem_lock(&mut h.channel, secret).unwrap().unwrap();
    assert!(h.reconciler.ledger().submitted_names().contains(&"withdraw"));

    // The redemption is keyed like any other submission.
    assert!(h.reconciler.redeem_lock(&mut h.channel, secret).unwrap().is_none());
}

#[test]
fn expired_lock_reclaimed_by_poller() {
    let mut h = Harness::opened();
    let secret = Secret::generate();
    let expiration = h.config.min_lock_expiration(h.height()) + 50;

    let lock = propose_lock(
        &h.channel,
        &h.founder,
        secret.lock_hash(),
        dec(25),
        expiration,
        &h.config,
        h.height(),
    )
    .unwrap();
    h.apply_signed(lock, &h.partner.clone());

    // Nothing to do while the lock is live.
    assert!(h.reconciler.poll(&mut h.channel).unwrap().is_none());

    // Strictly past expiration the poller reclaims it.
    h.reconciler.ledger().advance_to(expiration + 1);
    assert!(h.reconciler.poll(&mut h.channel).unwrap().is_some());
    assert!(h.reconciler.ledger().submitted_names().contains(&"withdrawSettle"));
}

#[test]
fn premature_lock_reclaim_rejected() {
    let mut h = Harness::opened();
    let secret = Secret::generate();
    let expiration = h.config.min_lock_expiration(h.height()) + 50;

    let lock = propose_lock(
        &h.channel,
        &h.founder,
        secret.lock_hash(),
        dec(25),
        expiration,
        &h.config,
        h.height(),
    )
    .unwrap();
    h.apply_signed(lock, &h.partner.clone());

    h.reconciler.ledger().advance_to(expiration); // at the boundary, not past it
    let err = h.reconciler.reclaim_expired_lock(&mut h.channel).unwrap_err();
    assert!(matches!(err, StatewireError::LockNotExpired { .. }));
}

#[test]
fn stale_remote_close_is_challenged_and_newest_state_wins() {
    let mut h = Harness::opened();

    // Advance the channel to nonce 2, both states fully signed.
    let p1 = propose_transfer(&h.channel, &h.founder, dec(30)).unwrap();
    h.apply_signed(p1, &h.partner.clone());
    let p2 = propose_transfer(&h.channel, &h.founder, dec(20)).unwrap();
    h.apply_signed(p2, &h.partner.clone());

    // Counterparty closes on-chain with the stale nonce-1 state.
    let outcome = h.reconciler.handle_remote_close(&mut h.channel, 1).unwrap();
    assert!(outcome.is_some(), "stale close must be challenged");
    assert_eq!(h.channel.state, ChannelState::Disputed);
    assert!(h.reconciler.ledger().submitted_names().contains(&"updateTransaction"));

    // Window still open: finalize does nothing.
    assert!(h.reconciler.finalize(&mut h.channel).unwrap().is_none());

    // Window elapses; settlement lands at the challenged (newer) state.
    let deadline = h.channel.dispute_deadline.unwrap();
    h.reconciler.ledger().advance_to(deadline + 1);
    assert!(h.reconciler.finalize(&mut h.channel).unwrap().is_some());
    assert_eq!(h.channel.state, ChannelState::Settled);
    assert!(h.reconciler.ledger().submitted_names().contains(&"settleTransaction"));

    // The settled balances are the nonce-2 ones.
    assert_eq!(h.channel.nonce, 2);
    assert_eq!(h.channel.free_balance(&h.founder.address()), dec(50));
    assert_eq!(h.channel.free_balance(&h.partner.address()), dec(150));
}

#[test]
fn current_remote_close_is_not_challenged() {
    let mut h = Harness::opened();
    let p1 = propose_transfer(&h.channel, &h.founder, dec(10)).unwrap();
    h.apply_signed(p1, &h.partner.clone());

    // Counterparty closes with our exact latest state: accept quietly.
    let outcome = h.reconciler.handle_remote_close(&mut h.channel, 1).unwrap();
    assert!(outcome.is_none());
    assert_eq!(h.channel.state, ChannelState::Closing);

    let deadline = h.channel.dispute_deadline.unwrap();
    h.reconciler.ledger().advance_to(deadline + 1);
    assert!(h.reconciler.finalize(&mut h.channel).unwrap().is_some());
    assert_eq!(h.channel.state, ChannelState::Settled);
}

#[test]
fn newer_remote_challenge_replaces_local_state() {
    let mut h = Harness::opened();
    let p1 = propose_transfer(&h.channel, &h.founder, dec(10)).unwrap();
    h.apply_signed(p1, &h.partner.clone());

    // We close at nonce 1; the counterparty challenges on-chain with a
    // nonce-2 state the contract has already accepted.
    h.reconciler.unilateral_close(&mut h.channel).unwrap().unwrap();
    let mut remote = BalanceSheet::new();
    remote.set(h.founder.address(), dec(50));
    remote.set(h.partner.address(), dec(150));
    let adopted = h
        .reconciler
        .adopt_remote_challenge(&mut h.channel, 2, remote, None)
        .unwrap();
    assert!(adopted);
    assert_eq!(h.channel.state, ChannelState::Disputed);
    assert_eq!(h.channel.nonce, 2);
    assert_eq!(h.channel.free_balance(&h.founder.address()), dec(50));
    assert_eq!(h.channel.free_balance(&h.partner.address()), dec(150));

    // A challenge at a nonce we already hold is ignored.
    let stale = h
        .reconciler
        .adopt_remote_challenge(&mut h.channel, 2, BalanceSheet::new(), None)
        .unwrap();
    assert!(!stale);
    assert_eq!(h.channel.free_balance(&h.partner.address()), dec(150));

    // The window elapses and the adopted state settles.
    let deadline = h.channel.dispute_deadline.unwrap();
    h.reconciler.ledger().advance_to(deadline + 1);
    assert!(h.reconciler.finalize(&mut h.channel).unwrap().is_some());
    assert_eq!(h.channel.state, ChannelState::Settled);
}

#[test]
fn unilateral_close_starts_dispute_window() {
    let mut h = Harness::opened();
    let p1 = propose_transfer(&h.channel, &h.founder, dec(10)).unwrap();
    h.apply_signed(p1, &h.partner.clone());

    h.reconciler.unilateral_close(&mut h.channel).unwrap().unwrap();
    assert_eq!(h.channel.state, ChannelState::Closing);
    let deadline = h.channel.dispute_deadline.unwrap();
    assert_eq!(deadline, h.height() + h.config.dispute_window_blocks);

    // Poll-driven finalization once the window has elapsed.
    h.reconciler.ledger().advance_to(deadline + 1);
    assert!(h.reconciler.poll(&mut h.channel).unwrap().is_some());
    assert_eq!(h.channel.state, ChannelState::Settled);
}

#[test]
fn deposit_tracked_to_confirmation() {
    let founder = KeyPair::generate();
    let partner = KeyPair::generate();
    let mut channel = Channel::open(
        founder.address(),
        partner.address(),
        "TNC",
        dec(100),
        dec(100),
    );
    countersign(&mut channel, &founder).unwrap();
    countersign(&mut channel, &partner).unwrap();

    let reconciler = SettlementReconciler::new(FakeLedger::default(), NodeConfig::default());
    let outcome = reconciler.fund(&mut channel).unwrap().unwrap();
    let tx = outcome.tx_data.unwrap();

    assert!(reconciler.track_deposit(&mut channel, &tx).unwrap());
    assert_eq!(channel.state, ChannelState::Opened);
    // The confirmation may be observed again.
    assert!(reconciler.track_deposit(&mut channel, &tx).unwrap());
}

#[test]
fn silent_peer_is_closed_unilaterally() {
    let mut h = Harness::opened();
    let p1 = propose_transfer(&h.channel, &h.founder, dec(10)).unwrap();
    h.apply_signed(p1, &h.partner.clone());

    // Fresh activity: nothing fires.
    assert!(h.reconciler.check_liveness(&mut h.channel).unwrap().is_none());

    // Backdate the last counterparty activity past the timeout.
    h.channel.updated_at =
        chrono::Utc::now() - chrono::Duration::seconds(i64::try_from(
            h.config.liveness_timeout_secs + 60,
        ).unwrap());
    assert!(h.reconciler.check_liveness(&mut h.channel).unwrap().is_some());
    assert_eq!(h.channel.state, ChannelState::Closing);
    assert!(h.reconciler.ledger().submitted_names().contains(&"closeChannel"));
}

#[test]
fn funding_rejects_out_of_range_deposits() {
    let founder = KeyPair::generate();
    let partner = KeyPair::generate();
    let mut channel = Channel::open(
        founder.address(),
        partner.address(),
        "TNC",
        dec(10_000), // above the configured maximum
        dec(100),
    );
    countersign(&mut channel, &founder).unwrap();
    countersign(&mut channel, &partner).unwrap();

    let reconciler = SettlementReconciler::new(FakeLedger::default(), NodeConfig::default());
    let err = reconciler.fund(&mut channel).unwrap_err();
    assert!(matches!(err, StatewireError::DepositOutOfRange { .. }));
}

#[test]
fn conservation_holds_across_every_flow() {
    let mut h = Harness::opened();
    let secret = Secret::generate();
    let expiration = h.config.min_lock_expiration(h.height()) + 50;

    let p = propose_transfer(&h.channel, &h.founder, dec(40)).unwrap();
    h.apply_signed(p, &h.partner.clone());
    assert!(h.channel.conservation_holds());

    let lock = propose_lock(
        &h.channel,
        &h.partner,
        secret.lock_hash(),
        dec(15),
        expiration,
        &h.config,
        h.height(),
    )
    .unwrap();
    h.apply_signed(lock, &h.founder.clone());
    assert!(h.channel.conservation_holds());

    let reveal = propose_reveal(&h.channel, &h.founder, secret).unwrap();
    h.apply_signed(reveal, &h.partner.clone());
    assert!(h.channel.conservation_holds());
    assert_eq!(h.channel.total_deposit(), dec(200));
}
