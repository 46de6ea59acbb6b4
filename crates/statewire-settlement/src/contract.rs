//! The settlement-contract call surface.
//!
//! [`ContractCall`] enumerates every write entry point of the on-chain
//! settlement contract with its exact argument shape. Amounts are
//! encoded as integer base units so they match what the signed state
//! payloads committed to. Builders take a [`Channel`] and assemble the
//! call from its current agreed state; a builder that needs both
//! signatures fails when the quorum is incomplete rather than emitting a
//! call the contract would reject.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use statewire_crypto::payload::to_base_units;
use statewire_types::ids::BlockHeight;
use statewire_types::{
    Address, Channel, ChannelId, LockHash, Result, Secret, Signature, StatewireError,
};

/// A write call to the settlement contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    /// Lock both parties' collateral; credit endorsement for the channel.
    Deposit {
        channel_id: ChannelId,
        nonce: u64,
        founder: Address,
        founder_amount: u64,
        partner: Address,
        partner_amount: u64,
        founder_signature: Signature,
        partner_signature: Signature,
    },
    /// Top up collateral on an already-open channel.
    UpdateDeposit {
        channel_id: ChannelId,
        nonce: u64,
        founder: Address,
        founder_amount: u64,
        partner: Address,
        partner_amount: u64,
        founder_signature: Signature,
        partner_signature: Signature,
    },
    /// Cooperative close at a mutually signed final state.
    QuickCloseChannel {
        channel_id: ChannelId,
        nonce: u64,
        founder: Address,
        founder_balance: u64,
        partner: Address,
        partner_balance: u64,
        founder_signature: Signature,
        partner_signature: Signature,
    },
    /// Withdraw agreed balances without closing the channel.
    WithdrawBalance {
        channel_id: ChannelId,
        nonce: u64,
        founder: Address,
        founder_balance: u64,
        partner: Address,
        partner_balance: u64,
        founder_signature: Signature,
        partner_signature: Signature,
    },
    /// Unilateral close; starts the dispute window.
    CloseChannel {
        channel_id: ChannelId,
        nonce: u64,
        founder: Address,
        founder_balance: u64,
        partner: Address,
        partner_balance: u64,
        lock_hash: Option<LockHash>,
        lock_secret: Option<Secret>,
        founder_signature: Signature,
        partner_signature: Signature,
    },
    /// Challenge a pending close with a strictly newer dual-signed state.
    UpdateTransaction {
        channel_id: ChannelId,
        nonce: u64,
        founder: Address,
        founder_balance: u64,
        partner: Address,
        partner_balance: u64,
        lock_hash: Option<LockHash>,
        lock_secret: Option<Secret>,
        founder_signature: Signature,
        partner_signature: Signature,
    },
    /// Finalize a close after the dispute window elapsed.
    SettleTransaction { channel_id: ChannelId },
    /// Redeem a hash lock on-chain by presenting the secret.
    Withdraw {
        channel_id: ChannelId,
        founder: Address,
        partner: Address,
        lock_period: BlockHeight,
        lock_amount: u64,
        lock_hash: LockHash,
        founder_signature: Signature,
        partner_signature: Signature,
        secret: Secret,
    },
    /// Reclaim an expired, unredeemed lock.
    WithdrawSettle {
        channel_id: ChannelId,
        lock_hash: LockHash,
    },
    /// Admin: set the contract-wide dispute window length.
    SetSettleTimeout { timeout: u64 },
    /// Admin: point the contract at the settlement token.
    SetToken { token_address: Address },
}

impl ContractCall {
    /// The on-chain method name this call maps to.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "deposit",
            Self::UpdateDeposit { .. } => "updateDeposit",
            Self::QuickCloseChannel { .. } => "quickCloseChannel",
            Self::WithdrawBalance { .. } => "withdrawBalance",
            Self::CloseChannel { .. } => "closeChannel",
            Self::UpdateTransaction { .. } => "updateTransaction",
            Self::SettleTransaction { .. } => "settleTransaction",
            Self::Withdraw { .. } => "withdraw",
            Self::WithdrawSettle { .. } => "withdrawSettle",
            Self::SetSettleTimeout { .. } => "setSettleTimeout",
            Self::SetToken { .. } => "setToken",
        }
    }

    /// The channel this call concerns, when it targets one.
    #[must_use]
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            Self::Deposit { channel_id, .. }
            | Self::UpdateDeposit { channel_id, .. }
            | Self::QuickCloseChannel { channel_id, .. }
            | Self::WithdrawBalance { channel_id, .. }
            | Self::CloseChannel { channel_id, .. }
            | Self::UpdateTransaction { channel_id, .. }
            | Self::SettleTransaction { channel_id }
            | Self::Withdraw { channel_id, .. }
            | Self::WithdrawSettle { channel_id, .. } => Some(*channel_id),
            Self::SetSettleTimeout { .. } | Self::SetToken { .. } => None,
        }
    }

    /// Both signatures over the channel's current state, or an error if
    /// the dual-signature quorum is incomplete.
    fn quorum(channel: &Channel) -> Result<(Signature, Signature)> {
        match (&channel.signatures.founder, &channel.signatures.partner) {
            (Some(f), Some(p)) => Ok((f.clone(), p.clone())),
            _ => Err(StatewireError::InvalidSignature {
                reason: format!(
                    "channel {} lacks dual-signature quorum",
                    channel.channel_id
                ),
            }),
        }
    }

    /// Funding call for a channel awaiting deposit confirmation.
    pub fn deposit_for(channel: &Channel) -> Result<Self> {
        let (founder_signature, partner_signature) = Self::quorum(channel)?;
        Ok(Self::Deposit {
            channel_id: channel.channel_id,
            nonce: channel.nonce,
            founder: channel.founder,
            founder_amount: to_base_units(channel.deposits.get(&channel.founder))?,
            partner: channel.partner,
            partner_amount: to_base_units(channel.deposits.get(&channel.partner))?,
            founder_signature,
            partner_signature,
        })
    }

    /// Collateral top-up for an open channel; the amounts are the
    /// *additional* deposits, not new totals.
    pub fn update_deposit_for(
        channel: &Channel,
        founder_add: Decimal,
        partner_add: Decimal,
    ) -> Result<Self> {
        let (founder_signature, partner_signature) = Self::quorum(channel)?;
        Ok(Self::UpdateDeposit {
            channel_id: channel.channel_id,
            nonce: channel.nonce,
            founder: channel.founder,
            founder_amount: to_base_units(founder_add)?,
            partner: channel.partner,
            partner_amount: to_base_units(partner_add)?,
            founder_signature,
            partner_signature,
        })
    }

    /// Cooperative close at the current dual-signed state.
    pub fn quick_close_for(channel: &Channel) -> Result<Self> {
        let (founder_signature, partner_signature) = Self::quorum(channel)?;
        Ok(Self::QuickCloseChannel {
            channel_id: channel.channel_id,
            nonce: channel.nonce,
            founder: channel.founder,
            founder_balance: to_base_units(channel.balances.get(&channel.founder))?,
            partner: channel.partner,
            partner_balance: to_base_units(channel.balances.get(&channel.partner))?,
            founder_signature,
            partner_signature,
        })
    }

    /// Withdraw the current dual-signed balances, leaving the channel
    /// open.
    pub fn withdraw_balance_for(channel: &Channel) -> Result<Self> {
        let (founder_signature, partner_signature) = Self::quorum(channel)?;
        Ok(Self::WithdrawBalance {
            channel_id: channel.channel_id,
            nonce: channel.nonce,
            founder: channel.founder,
            founder_balance: to_base_units(channel.balances.get(&channel.founder))?,
            partner: channel.partner,
            partner_balance: to_base_units(channel.balances.get(&channel.partner))?,
            founder_signature,
            partner_signature,
        })
    }

    /// Unilateral close at the last dual-signed state.
    pub fn close_for(channel: &Channel) -> Result<Self> {
        let (founder_signature, partner_signature) = Self::quorum(channel)?;
        let lock = channel.pending_lock();
        Ok(Self::CloseChannel {
            channel_id: channel.channel_id,
            nonce: channel.nonce,
            founder: channel.founder,
            founder_balance: to_base_units(channel.balances.get(&channel.founder))?,
            partner: channel.partner,
            partner_balance: to_base_units(channel.balances.get(&channel.partner))?,
            lock_hash: lock.map(|l| l.lock_hash),
            lock_secret: None,
            founder_signature,
            partner_signature,
        })
    }

    /// Challenge to a pending close, carrying this channel's newer
    /// dual-signed state.
    pub fn challenge_for(channel: &Channel) -> Result<Self> {
        let (founder_signature, partner_signature) = Self::quorum(channel)?;
        let lock = channel.pending_lock();
        Ok(Self::UpdateTransaction {
            channel_id: channel.channel_id,
            nonce: channel.nonce,
            founder: channel.founder,
            founder_balance: to_base_units(channel.balances.get(&channel.founder))?,
            partner: channel.partner,
            partner_balance: to_base_units(channel.balances.get(&channel.partner))?,
            lock_hash: lock.map(|l| l.lock_hash),
            lock_secret: None,
            founder_signature,
            partner_signature,
        })
    }

    /// On-chain redemption of the channel's lock with `secret`.
    pub fn withdraw_for(channel: &Channel, secret: Secret) -> Result<Self> {
        let lock_hash = secret.lock_hash();
        let lock = channel
            .locks
            .get(&lock_hash)
            .ok_or(StatewireError::LockNotFound(lock_hash))?;
        if !lock.verify_secret(&secret) {
            return Err(StatewireError::SecretMismatch);
        }
        let (founder_signature, partner_signature) = Self::quorum(channel)?;
        Ok(Self::Withdraw {
            channel_id: channel.channel_id,
            founder: lock.sender,
            partner: lock.receiver,
            lock_period: lock.expiration,
            lock_amount: to_base_units(lock.amount)?,
            lock_hash,
            founder_signature,
            partner_signature,
            secret,
        })
    }
}
