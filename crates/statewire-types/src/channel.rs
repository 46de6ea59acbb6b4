//! The channel record — the authoritative local view of one bilateral
//! payment channel.
//!
//! ## Lifecycle
//!
//! ```text
//!   ┌──────┐ deposits   ┌────────┐ coop close        ┌─────────┐      ┌────────┐
//!   │ INIT ├───────────▶│ OPENED ├──────────────────▶│ SETTLED ├─────▶│ CLOSED │
//!   └──────┘ confirmed  └───┬────┘                   └─────────┘      └────────┘
//!                           │ unilateral close            ▲
//!                           ▼                             │ window elapses
//!                      ┌─────────┐  higher nonce  ┌──────────┐
//!                      │ CLOSING ├───────────────▶│ DISPUTED │
//!                      └─────────┘◀───────────────└──────────┘
//!                                  window restarts
//! ```
//!
//! The ledger contract holds the authoritative on-chain mirror used for
//! dispute arbitration; this record must reconcile with it, never
//! silently diverge.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::balance::{AssetType, BalanceSheet};
use crate::ids::{Address, BlockHeight, ChannelId, Signature};
use crate::lock::{HtlcLock, LockHash};

// ---------------------------------------------------------------------------
// ChannelState
// ---------------------------------------------------------------------------

/// Lifecycle state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelState {
    /// Terms proposed; deposits not yet confirmed on-chain.
    Init,
    /// Both deposits confirmed; off-chain updates flowing.
    Opened,
    /// A unilateral close was submitted; dispute window running.
    Closing,
    /// A challenge with a newer state landed; window restarted.
    Disputed,
    /// Final balances fixed on-chain. **Irreversible.**
    Settled,
    /// Deposits released; the record is terminal.
    Closed,
}

impl ChannelState {
    /// Whether this state may transition to `target`.
    ///
    /// The `Opened → Opened` self-loop (a committed proposal) is not a
    /// transition in this sense; it only bumps the nonce.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Init, Self::Opened)
                | (Self::Opened, Self::Closing | Self::Settled)
                | (Self::Closing, Self::Disputed | Self::Settled)
                | (Self::Disputed, Self::Closing | Self::Settled)
                | (Self::Settled, Self::Closed)
        )
    }

    /// Whether the channel has reached a settlement-final state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Closed)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Opened => write!(f, "OPENED"),
            Self::Closing => write!(f, "CLOSING"),
            Self::Disputed => write!(f, "DISPUTED"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Role / SignaturePair
// ---------------------------------------------------------------------------

/// Which side of the channel a party occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Founder,
    Partner,
}

/// Both parties' signatures over the canonical encoding of the current
/// channel state. The state is *agreed* only when both are present and
/// verify.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePair {
    pub founder: Option<Signature>,
    pub partner: Option<Signature>,
}

impl SignaturePair {
    /// Dual-signature quorum reached (structurally; verification is the
    /// crypto layer's job).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.founder.is_some() && self.partner.is_some()
    }

    /// Record `sig` in the slot for `role`, replacing any previous one.
    pub fn record(&mut self, role: Role, sig: Signature) {
        match role {
            Role::Founder => self.founder = Some(sig),
            Role::Partner => self.partner = Some(sig),
        }
    }

    /// The signature recorded for `role`, if any.
    #[must_use]
    pub fn get(&self, role: Role) -> Option<&Signature> {
        match role {
            Role::Founder => self.founder.as_ref(),
            Role::Partner => self.partner.as_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// The local record of one bilateral channel's current agreed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Opaque 32-byte identifier, unique across all channels.
    pub channel_id: ChannelId,
    /// The party that proposed the channel.
    pub founder: Address,
    /// The counterparty.
    pub partner: Address,
    /// Asset locked in the channel.
    pub asset_type: AssetType,
    /// On-chain locked collateral per party.
    pub deposits: BalanceSheet,
    /// Current off-chain-agreed claimable amounts per party.
    pub balances: BalanceSheet,
    /// Strictly increasing update sequence number.
    pub nonce: u64,
    /// Lifecycle state.
    pub state: ChannelState,
    /// Open HTLC entries, keyed by lock hash. At most one may be
    /// unresolved at a time (the settlement contract resolves one lock
    /// per close).
    pub locks: BTreeMap<LockHash, HtlcLock>,
    /// Dual signatures over the canonical encoding of the current state.
    pub signatures: SignaturePair,
    /// Ledger height at which a running dispute window elapses.
    pub dispute_deadline: Option<BlockHeight>,
    /// Last time the counterparty produced a state change we accepted.
    /// Drives the wall-clock liveness timeout.
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    /// Create a channel in `INIT` with equal balances and deposits.
    #[must_use]
    pub fn open(
        founder: Address,
        partner: Address,
        asset_type: impl Into<AssetType>,
        founder_deposit: Decimal,
        partner_deposit: Decimal,
    ) -> Self {
        let deposits =
            BalanceSheet::with_parties(founder, founder_deposit, partner, partner_deposit);
        Self {
            channel_id: ChannelId::derive(&founder, &partner),
            founder,
            partner,
            asset_type: asset_type.into(),
            balances: deposits.clone(),
            deposits,
            nonce: 0,
            state: ChannelState::Init,
            locks: BTreeMap::new(),
            signatures: SignaturePair::default(),
            dispute_deadline: None,
            updated_at: Utc::now(),
        }
    }

    /// The role `party` plays in this channel, if any.
    #[must_use]
    pub fn role_of(&self, party: &Address) -> Option<Role> {
        if *party == self.founder {
            Some(Role::Founder)
        } else if *party == self.partner {
            Some(Role::Partner)
        } else {
            None
        }
    }

    /// The other side of the channel relative to `party`.
    #[must_use]
    pub fn counterparty(&self, party: &Address) -> Option<Address> {
        match self.role_of(party)? {
            Role::Founder => Some(self.partner),
            Role::Partner => Some(self.founder),
        }
    }

    /// Whether `a`/`b` are this channel's parties, in either orientation.
    #[must_use]
    pub fn is_between(&self, a: &Address, b: &Address) -> bool {
        (self.founder == *a && self.partner == *b) || (self.founder == *b && self.partner == *a)
    }

    /// Total collateral locked on-chain.
    #[must_use]
    pub fn total_deposit(&self) -> Decimal {
        self.deposits.total()
    }

    /// Sum of amounts held by unresolved locks.
    #[must_use]
    pub fn locked_total(&self) -> Decimal {
        self.locks
            .values()
            .filter(|l| l.secret.is_none())
            .map(|l| l.amount)
            .sum()
    }

    /// The single unresolved lock, if one is pending.
    #[must_use]
    pub fn pending_lock(&self) -> Option<&HtlcLock> {
        self.locks.values().find(|l| l.secret.is_none())
    }

    /// Spendable balance of `party` — the recorded balance, since lock
    /// amounts are deducted when the lock is created.
    #[must_use]
    pub fn free_balance(&self, party: &Address) -> Decimal {
        self.balances.get(party)
    }

    /// The conservation invariant:
    /// `sum(balances) + sum(locked) == sum(deposits)`.
    #[must_use]
    pub fn conservation_holds(&self) -> bool {
        self.balances.total() + self.locked_total() == self.deposits.total()
    }

    /// Whether both parties have signed the current state.
    #[must_use]
    pub fn is_agreed(&self) -> bool {
        self.signatures.is_complete()
    }

    /// Whether the counterparty has been silent longer than
    /// `timeout_secs` — the trigger for a unilateral close.
    #[must_use]
    pub fn peer_silent_for(&self, timeout_secs: u64) -> bool {
        let silent = Utc::now() - self.updated_at;
        silent > chrono::Duration::seconds(i64::try_from(timeout_secs).unwrap_or(i64::MAX))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn make_channel() -> Channel {
        Channel::open(
            Address([1u8; 20]),
            Address([2u8; 20]),
            "TNC",
            dec(100),
            dec(100),
        )
    }

    #[test]
    fn open_starts_in_init() {
        let ch = make_channel();
        assert_eq!(ch.state, ChannelState::Init);
        assert_eq!(ch.nonce, 0);
        assert_eq!(ch.total_deposit(), dec(200));
        assert!(ch.conservation_holds());
        assert!(!ch.is_agreed());
    }

    #[test]
    fn state_transitions_valid() {
        use ChannelState::*;
        assert!(Init.can_transition_to(Opened));
        assert!(Opened.can_transition_to(Closing));
        assert!(Opened.can_transition_to(Settled));
        assert!(Closing.can_transition_to(Disputed));
        assert!(Closing.can_transition_to(Settled));
        assert!(Disputed.can_transition_to(Closing));
        assert!(Disputed.can_transition_to(Settled));
        assert!(Settled.can_transition_to(Closed));
    }

    #[test]
    fn state_transitions_invalid() {
        use ChannelState::*;
        assert!(!Settled.can_transition_to(Opened), "settlement is irreversible");
        assert!(!Closed.can_transition_to(Opened));
        assert!(!Init.can_transition_to(Settled));
        assert!(!Opened.can_transition_to(Disputed), "dispute requires a pending close");
        assert!(!Closing.can_transition_to(Opened));
    }

    #[test]
    fn terminal_states() {
        assert!(ChannelState::Settled.is_terminal());
        assert!(ChannelState::Closed.is_terminal());
        assert!(!ChannelState::Closing.is_terminal());
    }

    #[test]
    fn roles_and_counterparty() {
        let ch = make_channel();
        assert_eq!(ch.role_of(&ch.founder), Some(Role::Founder));
        assert_eq!(ch.role_of(&ch.partner), Some(Role::Partner));
        assert_eq!(ch.role_of(&Address([9u8; 20])), None);
        assert_eq!(ch.counterparty(&ch.founder), Some(ch.partner));
        assert_eq!(ch.counterparty(&ch.partner), Some(ch.founder));
    }

    #[test]
    fn is_between_either_orientation() {
        let ch = make_channel();
        assert!(ch.is_between(&ch.founder, &ch.partner));
        assert!(ch.is_between(&ch.partner, &ch.founder));
        assert!(!ch.is_between(&ch.founder, &Address([9u8; 20])));
    }

    #[test]
    fn conservation_with_pending_lock() {
        let mut ch = make_channel();
        let secret = crate::Secret::from_bytes([5u8; 32]);
        let lock = HtlcLock::new(secret.lock_hash(), dec(30), ch.founder, ch.partner, 500);
        // Lock creation deducts the amount from the sender's balance.
        ch.balances.debit(ch.founder, dec(30)).unwrap();
        ch.locks.insert(lock.lock_hash, lock);

        assert_eq!(ch.locked_total(), dec(30));
        assert_eq!(ch.free_balance(&ch.founder), dec(70));
        assert!(ch.conservation_holds());
        assert!(ch.pending_lock().is_some());
    }

    #[test]
    fn signature_pair_quorum() {
        let mut sigs = SignaturePair::default();
        assert!(!sigs.is_complete());
        sigs.record(Role::Founder, Signature(vec![0u8; 65]));
        assert!(!sigs.is_complete());
        sigs.record(Role::Partner, Signature(vec![1u8; 65]));
        assert!(sigs.is_complete());
        assert!(sigs.get(Role::Founder).is_some());
    }

    #[test]
    fn serde_roundtrip() {
        let ch = make_channel();
        let json = serde_json::to_string(&ch).unwrap();
        let back: Channel = serde_json::from_str(&json).unwrap();
        assert_eq!(ch.channel_id, back.channel_id);
        assert_eq!(ch.balances, back.balances);
        assert_eq!(ch.state, back.state);
    }
}
