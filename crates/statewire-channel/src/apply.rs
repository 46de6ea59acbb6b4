//! Proposal validation and application.
//!
//! A [`SignedProposal`] is a full replacement of the channel's balances
//! and lock set at nonce `current + 1`, carrying the sender's signature
//! over the canonical encoding. [`validate_proposal`] runs every check
//! against the current channel snapshot; [`commit_proposal`] then swaps
//! the state in. Neither touches the channel unless all checks pass.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::debug;

use statewire_crypto::payload::StatePayload;
use statewire_crypto::sig::verify_signature;
use statewire_crypto::Signer;
use statewire_types::{
    Address, Channel, ChannelState, HtlcLock, NodeConfig, Result, Signature, SignaturePair,
    SignedProposal, StatewireError,
};
use statewire_types::constants::MAX_OPEN_LOCKS;
use statewire_types::ids::BlockHeight;

/// Validate `proposal` against the current channel snapshot.
///
/// Checks, in order: channel identity, lifecycle state, nonce ordering,
/// party membership, balance shape, lock discipline, conservation, and
/// finally the sender's signature. The signature check runs last so a
/// malformed proposal is reported by its structural defect, not as a
/// generic signature failure.
pub fn validate_proposal(
    channel: &Channel,
    proposal: &SignedProposal,
    config: &NodeConfig,
    height: BlockHeight,
) -> Result<()> {
    if proposal.channel_id != channel.channel_id {
        return Err(StatewireError::ChannelNotFound(proposal.channel_id));
    }
    if channel.state != ChannelState::Opened {
        return Err(StatewireError::ChannelNotOpen {
            state: channel.state,
        });
    }

    // Exactly current + 1. A replay of the committed state is a
    // duplicate delivery, not an attack; callers treat AlreadyApplied
    // as success. A *different* state at the current nonce is a fork
    // and gets the same stale rejection as any other out-of-order
    // proposal.
    if proposal.nonce == channel.nonce {
        if proposal.balances == channel.balances && proposal.locks == channel.locks {
            return Err(StatewireError::AlreadyApplied {
                nonce: proposal.nonce,
            });
        }
        return Err(StatewireError::StaleProposal {
            expected: channel.nonce + 1,
            got: proposal.nonce,
        });
    }
    if proposal.nonce != channel.nonce + 1 {
        return Err(StatewireError::StaleProposal {
            expected: channel.nonce + 1,
            got: proposal.nonce,
        });
    }

    if channel.role_of(&proposal.sender).is_none() {
        return Err(StatewireError::UnknownParty(proposal.sender));
    }

    // The replacement sheet must cover exactly the two channel parties.
    if proposal.balances.len() != 2
        || !proposal.balances.is_party(&channel.founder)
        || !proposal.balances.is_party(&channel.partner)
    {
        return Err(StatewireError::MalformedPayload {
            reason: "balance sheet must cover exactly the two channel parties".into(),
        });
    }
    if proposal.balances.any_negative() {
        for (party, amount) in proposal.balances.iter() {
            if amount.is_sign_negative() && !amount.is_zero() {
                return Err(StatewireError::NegativeBalance { party: *party });
            }
        }
    }

    validate_locks(channel, proposal, config, height)?;

    // Conservation: the replacement balances plus unresolved lock amounts
    // must still sum to the on-chain deposit total.
    let locked: Decimal = proposal
        .locks
        .values()
        .filter(|l| l.secret.is_none())
        .map(|l| l.amount)
        .sum();
    let actual = proposal.balances.total() + locked;
    let expected = channel.deposits.total();
    if actual != expected {
        return Err(StatewireError::ConservationViolation { expected, actual });
    }

    let payload = StatePayload::from_parts(
        proposal.channel_id,
        proposal.nonce,
        channel.founder,
        channel.partner,
        &proposal.balances,
        proposal.pending_lock(),
    )?;
    verify_signature(&payload.digest(), &proposal.signature, &proposal.sender)
}

fn validate_locks(
    channel: &Channel,
    proposal: &SignedProposal,
    config: &NodeConfig,
    height: BlockHeight,
) -> Result<()> {
    let unresolved = proposal
        .locks
        .values()
        .filter(|l| l.secret.is_none())
        .count();
    if unresolved > MAX_OPEN_LOCKS {
        // The settlement contract resolves one lock per close; a state
        // with several unresolved locks could not be enforced on-chain.
        if let Some(existing) = channel.pending_lock() {
            return Err(StatewireError::LockAlreadyPending(existing.lock_hash));
        }
        return Err(StatewireError::MalformedPayload {
            reason: format!("{unresolved} unresolved locks, at most {MAX_OPEN_LOCKS} allowed"),
        });
    }

    for lock in proposal.locks.values() {
        if channel.role_of(&lock.sender).is_none() {
            return Err(StatewireError::UnknownParty(lock.sender));
        }
        if channel.role_of(&lock.receiver).is_none() {
            return Err(StatewireError::UnknownParty(lock.receiver));
        }
        if !channel.locks.contains_key(&lock.lock_hash) {
            validate_new_lock(channel, proposal, lock, config, height)?;
        }
    }

    // Continuity against the current lock set: an existing lock may
    // only leave the set or resolve through one of the sanctioned
    // moves, each with its exact balance effect. Without this a
    // counterparty could drop a pending lock (or "resolve" it with a
    // bogus secret) and pocket the amount while conservation still
    // balances.
    for (hash, current) in &channel.locks {
        match proposal.locks.get(hash) {
            Some(next) => {
                if next.amount != current.amount
                    || next.sender != current.sender
                    || next.receiver != current.receiver
                    || next.expiration != current.expiration
                {
                    return Err(StatewireError::MalformedPayload {
                        reason: format!("lock {hash} altered in place"),
                    });
                }
                match (&current.secret, &next.secret) {
                    (None, Some(secret)) => {
                        if !current.verify_secret(secret) {
                            return Err(StatewireError::SecretMismatch);
                        }
                        expect_exact_credit(channel, proposal, current, current.receiver)?;
                    }
                    (Some(recorded), Some(next_secret)) if recorded != next_secret => {
                        return Err(StatewireError::SecretMismatch);
                    }
                    (Some(_), None) => {
                        return Err(StatewireError::MalformedPayload {
                            reason: format!("resolved lock {hash} reverted to pending"),
                        });
                    }
                    _ => {}
                }
            }
            // A resolved lock's credit is already on the books; pruning
            // it from a later state is free.
            None if current.secret.is_some() => {}
            None => {
                // Omitting a pending lock is only ever the expiry
                // refund, and only strictly past the expiration height.
                if !current.is_expired(height) {
                    return Err(StatewireError::LockNotExpired {
                        expiration: current.expiration,
                        height,
                    });
                }
                expect_exact_credit(channel, proposal, current, current.sender)?;
            }
        }
    }
    Ok(())
}

/// A lock entering the set must be pending, funded by the proposal's
/// sender, expire comfortably past the dispute window, and debit
/// exactly its amount from the sender's balance.
fn validate_new_lock(
    channel: &Channel,
    proposal: &SignedProposal,
    lock: &HtlcLock,
    config: &NodeConfig,
    height: BlockHeight,
) -> Result<()> {
    if lock.secret.is_some() {
        return Err(StatewireError::MalformedPayload {
            reason: format!("lock {} introduced already resolved", lock.lock_hash),
        });
    }
    if lock.sender != proposal.sender {
        return Err(StatewireError::MalformedPayload {
            reason: format!("lock {} not funded by the proposal sender", lock.lock_hash),
        });
    }
    let min_expiration = config.min_lock_expiration(height);
    if lock.expiration <= min_expiration {
        return Err(StatewireError::LockExpiresTooSoon {
            expiration: lock.expiration,
            min_expiration,
        });
    }
    let other = channel
        .counterparty(&lock.sender)
        .ok_or(StatewireError::UnknownParty(lock.sender))?;
    if proposal.balances.get(&lock.sender) != channel.balances.get(&lock.sender) - lock.amount
        || proposal.balances.get(&other) != channel.balances.get(&other)
    {
        return Err(StatewireError::MalformedPayload {
            reason: format!("lock {} must debit exactly its amount from the sender", lock.lock_hash),
        });
    }
    Ok(())
}

/// A lock leaving the set (reveal or expiry refund) must move exactly
/// its amount to `to` and leave the other party's balance untouched.
fn expect_exact_credit(
    channel: &Channel,
    proposal: &SignedProposal,
    lock: &HtlcLock,
    to: Address,
) -> Result<()> {
    let other = channel
        .counterparty(&to)
        .ok_or(StatewireError::UnknownParty(to))?;
    if proposal.balances.get(&to) != channel.balances.get(&to) + lock.amount
        || proposal.balances.get(&other) != channel.balances.get(&other)
    {
        return Err(StatewireError::MalformedPayload {
            reason: format!(
                "lock {} must credit exactly its amount to {}",
                lock.lock_hash,
                to.short()
            ),
        });
    }
    Ok(())
}

/// Install a validated proposal as the channel's current state.
///
/// The nonce advances, the lock set and balances are replaced, and the
/// signature slots reset to hold only the sender's — the state is not
/// *agreed* until the local side countersigns.
pub fn commit_proposal(channel: &mut Channel, proposal: SignedProposal) -> Result<()> {
    let role = channel
        .role_of(&proposal.sender)
        .ok_or(StatewireError::UnknownParty(proposal.sender))?;

    channel.balances = proposal.balances;
    channel.locks = proposal.locks;
    channel.nonce = proposal.nonce;
    channel.signatures = SignaturePair::default();
    channel.signatures.record(role, proposal.signature);
    channel.updated_at = Utc::now();

    debug!(
        channel = %channel.channel_id,
        nonce = channel.nonce,
        "committed proposal"
    );
    Ok(())
}

/// Sign the channel's current state with the local key and record the
/// signature in the local party's slot. Returns the signature so it can
/// be relayed to the counterparty.
pub fn countersign<S: Signer>(channel: &mut Channel, signer: &S) -> Result<Signature> {
    let role = channel
        .role_of(&signer.address())
        .ok_or(StatewireError::UnknownParty(signer.address()))?;
    let payload = StatePayload::from_channel(channel)?;
    let sig = signer.sign(&payload.digest())?;
    channel.signatures.record(role, sig.clone());
    Ok(sig)
}

/// Build and sign a plain payment proposal moving `amount` from the
/// local party to the counterparty at the next nonce.
///
/// The channel itself is not modified; the returned proposal goes
/// through [`validate_proposal`] / [`commit_proposal`] like any other,
/// locally and on the remote side.
pub fn propose_transfer<S: Signer>(
    channel: &Channel,
    signer: &S,
    amount: Decimal,
) -> Result<SignedProposal> {
    if channel.state != ChannelState::Opened {
        return Err(StatewireError::ChannelNotOpen {
            state: channel.state,
        });
    }
    let sender = signer.address();
    let receiver = channel
        .counterparty(&sender)
        .ok_or(StatewireError::UnknownParty(sender))?;

    let available = channel.free_balance(&sender);
    if amount > available {
        return Err(StatewireError::InsufficientBalance {
            needed: amount,
            available,
        });
    }

    let mut balances = channel.balances.clone();
    balances.debit(sender, amount)?;
    balances.credit(receiver, amount);

    let nonce = channel.nonce + 1;
    // Resolved locks already paid out; drop them so the map stays
    // bounded over a long-lived channel.
    let mut locks = channel.locks.clone();
    locks.retain(|_, l| l.secret.is_none());
    let payload = StatePayload::from_parts(
        channel.channel_id,
        nonce,
        channel.founder,
        channel.partner,
        &balances,
        locks.values().find(|l| l.secret.is_none()),
    )?;
    let signature = signer.sign(&payload.digest())?;

    Ok(SignedProposal {
        channel_id: channel.channel_id,
        nonce,
        balances,
        locks,
        sender,
        signature,
    })
}
