//! Off-chain protocol message shapes carried over the external gateway.
//!
//! The gateway is an external relay; these types only fix the wire shape.
//! Peers are addressed by `address@host` URLs, distinct from their
//! settlement addresses.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::balance::{AssetType, BalanceSheet};
use crate::ids::ChannelId;
use crate::proposal::SignedProposal;

/// Peer URL of the form `address@host:port`.
pub type PeerUrl = String;

/// Discriminates the gateway message variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// A new channel was created and should be announced.
    RegisterChannel,
    /// A channel's agreed balances changed.
    UpdateChannel,
    /// Wallet-level announcement of this node's identity and limits.
    SyncWallet,
    /// A protocol message for the counterparty (carries a proposal).
    TransactionMessage,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegisterChannel => write!(f, "RegisterChannel"),
            Self::UpdateChannel => write!(f, "UpdateChannel"),
            Self::SyncWallet => write!(f, "SyncWallet"),
            Self::TransactionMessage => write!(f, "TransactionMessage"),
        }
    }
}

/// Payload of a gateway message; shape matches the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "PascalCase")]
pub enum MessageBody {
    /// Body for `RegisterChannel`.
    Register {
        asset_type: AssetType,
        founder_deposit: Decimal,
        partner_deposit: Decimal,
    },
    /// Body for `UpdateChannel`.
    Update { nonce: u64, balance: BalanceSheet },
    /// Body for `SyncWallet`.
    Wallet {
        public_key: String,
        commit_min_deposit: Decimal,
        fee: Decimal,
        alias: String,
        auto_create: bool,
        max_channel: usize,
        balance: BTreeMap<AssetType, Decimal>,
    },
    /// Body for `TransactionMessage`.
    Transaction { proposal: SignedProposal },
}

/// One message delivered through the gateway relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GatewayMessage {
    pub message_type: MessageType,
    pub sender: PeerUrl,
    pub receiver: PeerUrl,
    /// Absent for wallet-level messages.
    pub channel_name: Option<ChannelId>,
    pub message_body: MessageBody,
}

impl GatewayMessage {
    /// Key identifying a balance-bearing message for duplicate detection:
    /// `(channel, nonce)` when both are present.
    #[must_use]
    pub fn dedup_key(&self) -> Option<(ChannelId, u64)> {
        let channel = self.channel_name?;
        match &self.message_body {
            MessageBody::Update { nonce, .. } => Some((channel, *nonce)),
            MessageBody::Transaction { proposal } => Some((channel, proposal.nonce)),
            _ => None,
        }
    }
}
