//! The HTLC conditional-transfer sub-protocol.
//!
//! Three moves, each expressed as an ordinary signed proposal at the
//! next nonce so HTLC resolution rides the same validate/commit path as
//! plain payments:
//!
//! 1. **Lock** ([`propose_lock`]): the sender reserves `amount` behind
//!    the receiver's hash lock; the amount leaves the sender's balance
//!    and sits in the lock until it resolves.
//! 2. **Reveal** ([`propose_reveal`]): the receiver discloses the
//!    secret; the locked amount becomes theirs.
//! 3. **Expire** ([`propose_lock_expiry`]): past the expiration height
//!    the sender reclaims the amount cooperatively. (The uncooperative
//!    path goes on-chain through the settlement crate.)

use rust_decimal::Decimal;
use tracing::debug;

use statewire_crypto::payload::StatePayload;
use statewire_crypto::Signer;
use statewire_types::ids::BlockHeight;
use statewire_types::{
    Channel, ChannelState, HtlcLock, LockHash, NodeConfig, Result, Secret, SignedProposal,
    StatewireError,
};

/// Build and sign a proposal that introduces a new hash lock funded from
/// the local party's balance.
///
/// `lock_hash` comes from the receiver (who alone knows the secret);
/// `expiration` must clear the dispute window plus safety margin at the
/// current ledger `height`, or a failed cooperative path could leave the
/// receiver unable to redeem on-chain before the sender reclaims.
pub fn propose_lock<S: Signer>(
    channel: &Channel,
    signer: &S,
    lock_hash: LockHash,
    amount: Decimal,
    expiration: BlockHeight,
    config: &NodeConfig,
    height: BlockHeight,
) -> Result<SignedProposal> {
    if channel.state != ChannelState::Opened {
        return Err(StatewireError::ChannelNotOpen {
            state: channel.state,
        });
    }
    if let Some(pending) = channel.pending_lock() {
        return Err(StatewireError::LockAlreadyPending(pending.lock_hash));
    }

    let min_expiration = config.min_lock_expiration(height);
    if expiration <= min_expiration {
        return Err(StatewireError::LockExpiresTooSoon {
            expiration,
            min_expiration,
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

    let lock = HtlcLock::new(lock_hash, amount, sender, receiver, expiration);
    let mut locks = channel.locks.clone();
    locks.retain(|_, l| l.secret.is_none());
    locks.insert(lock.lock_hash, lock.clone());

    let nonce = channel.nonce + 1;
    let payload = StatePayload::from_parts(
        channel.channel_id,
        nonce,
        channel.founder,
        channel.partner,
        &balances,
        Some(&lock),
    )?;
    let signature = signer.sign(&payload.digest())?;

    debug!(channel = %channel.channel_id, lock = %lock_hash, %amount, "proposing lock");
    Ok(SignedProposal {
        channel_id: channel.channel_id,
        nonce,
        balances,
        locks,
        sender,
        signature,
    })
}

/// Build and sign a proposal that resolves the pending lock by revealing
/// its secret, crediting the locked amount to the receiver.
///
/// Only the lock's receiver can make this move; the secret is retained
/// on the resolved lock so the sender can redeem on-chain if the channel
/// later closes uncooperatively.
pub fn propose_reveal<S: Signer>(
    channel: &Channel,
    signer: &S,
    secret: Secret,
) -> Result<SignedProposal> {
    if channel.state != ChannelState::Opened {
        return Err(StatewireError::ChannelNotOpen {
            state: channel.state,
        });
    }
    let lock_hash = secret.lock_hash();
    let lock = channel
        .locks
        .get(&lock_hash)
        .ok_or(StatewireError::LockNotFound(lock_hash))?;
    if lock.secret.is_some() {
        return Err(StatewireError::AlreadyApplied {
            nonce: channel.nonce,
        });
    }
    if !lock.verify_secret(&secret) {
        return Err(StatewireError::SecretMismatch);
    }
    if signer.address() != lock.receiver {
        return Err(StatewireError::UnknownParty(signer.address()));
    }

    let mut balances = channel.balances.clone();
    balances.credit(lock.receiver, lock.amount);

    let mut locks = channel.locks.clone();
    if let Some(resolved) = locks.get_mut(&lock_hash) {
        resolved.secret = Some(secret);
    }

    let nonce = channel.nonce + 1;
    let payload = StatePayload::from_parts(
        channel.channel_id,
        nonce,
        channel.founder,
        channel.partner,
        &balances,
        None, // the lock is resolved; the payload is bare again
    )?;
    let signature = signer.sign(&payload.digest())?;

    debug!(channel = %channel.channel_id, lock = %lock_hash, "proposing reveal");
    Ok(SignedProposal {
        channel_id: channel.channel_id,
        nonce,
        balances,
        locks,
        sender: signer.address(),
        signature,
    })
}

/// Build and sign a proposal that refunds an expired, unrevealed lock
/// back to its sender.
///
/// Allowed only strictly past the expiration height. This is the
/// cooperative unwind; if the counterparty refuses to countersign, the
/// sender falls back to an on-chain `withdrawSettle`.
pub fn propose_lock_expiry<S: Signer>(
    channel: &Channel,
    signer: &S,
    lock_hash: LockHash,
    height: BlockHeight,
) -> Result<SignedProposal> {
    if channel.state != ChannelState::Opened {
        return Err(StatewireError::ChannelNotOpen {
            state: channel.state,
        });
    }
    let lock = channel
        .locks
        .get(&lock_hash)
        .ok_or(StatewireError::LockNotFound(lock_hash))?;
    if lock.secret.is_some() {
        return Err(StatewireError::AlreadyApplied {
            nonce: channel.nonce,
        });
    }
    if !lock.is_expired(height) {
        return Err(StatewireError::LockNotExpired {
            expiration: lock.expiration,
            height,
        });
    }
    if signer.address() != lock.sender {
        return Err(StatewireError::UnknownParty(signer.address()));
    }

    let mut balances = channel.balances.clone();
    balances.credit(lock.sender, lock.amount);

    let mut locks = channel.locks.clone();
    locks.remove(&lock_hash);
    locks.retain(|_, l| l.secret.is_none());

    let nonce = channel.nonce + 1;
    let payload = StatePayload::from_parts(
        channel.channel_id,
        nonce,
        channel.founder,
        channel.partner,
        &balances,
        None,
    )?;
    let signature = signer.sign(&payload.digest())?;

    debug!(channel = %channel.channel_id, lock = %lock_hash, "proposing lock expiry refund");
    Ok(SignedProposal {
        channel_id: channel.channel_id,
        nonce,
        balances,
        locks,
        sender: signer.address(),
        signature,
    })
}
