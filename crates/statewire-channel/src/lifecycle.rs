//! Channel lifecycle transitions.
//!
//! Every transition funnels through [`transition`], which enforces the
//! state machine and the one special case: asking to settle an
//! already-settled channel reports [`StatewireError::AlreadySettled`],
//! which callers treat as an idempotent success (settlement
//! confirmations arrive at least once, sometimes more).

use chrono::Utc;
use tracing::info;

use statewire_types::ids::BlockHeight;
use statewire_types::{Channel, ChannelState, Result, StatewireError};

/// Move `channel` to `target`, enforcing the lifecycle state machine.
pub fn transition(channel: &mut Channel, target: ChannelState) -> Result<()> {
    if target == ChannelState::Settled && channel.state.is_terminal() {
        return Err(StatewireError::AlreadySettled(channel.channel_id));
    }
    if !channel.state.can_transition_to(target) {
        return Err(StatewireError::InvalidTransition {
            from: channel.state,
            to: target,
        });
    }
    info!(
        channel = %channel.channel_id,
        from = %channel.state,
        to = %target,
        "channel transition"
    );
    channel.state = target;
    channel.updated_at = Utc::now();
    Ok(())
}

/// Deposits confirmed on-chain: the channel starts carrying updates.
pub fn mark_opened(channel: &mut Channel) -> Result<()> {
    transition(channel, ChannelState::Opened)
}

/// A unilateral close landed on-chain; the dispute window runs until
/// `deadline`.
pub fn begin_close(channel: &mut Channel, deadline: BlockHeight) -> Result<()> {
    transition(channel, ChannelState::Closing)?;
    channel.dispute_deadline = Some(deadline);
    Ok(())
}

/// A challenge carrying a strictly newer dual-signed state was accepted
/// on-chain; the window restarts at `deadline`.
///
/// Valid from `Closing` (first challenge) and from `Disputed` (a
/// counter-challenge with an even newer state).
pub fn challenge(channel: &mut Channel, deadline: BlockHeight) -> Result<()> {
    match channel.state {
        ChannelState::Closing => transition(channel, ChannelState::Disputed)?,
        ChannelState::Disputed => {
            // Already disputed; only the deadline moves.
            channel.updated_at = Utc::now();
        }
        _ => {
            return Err(StatewireError::InvalidTransition {
                from: channel.state,
                to: ChannelState::Disputed,
            });
        }
    }
    channel.dispute_deadline = Some(deadline);
    Ok(())
}

/// Final balances fixed on-chain. Irreversible; repeated confirmations
/// surface as [`StatewireError::AlreadySettled`].
pub fn mark_settled(channel: &mut Channel) -> Result<()> {
    transition(channel, ChannelState::Settled)?;
    channel.dispute_deadline = None;
    Ok(())
}

/// Deposits released; the record is terminal.
pub fn mark_closed(channel: &mut Channel) -> Result<()> {
    transition(channel, ChannelState::Closed)
}
