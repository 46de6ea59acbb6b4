//! Outbound announcements and inbound normalization.
//!
//! [`SyncAdapter`] is the only place protocol messages are built or
//! parsed. Outbound, it announces channel creation, balance changes and
//! wallet identity. Inbound, it parses raw relay payloads and drops
//! duplicate deliveries by `(channel, nonce)` before anything reaches
//! the channel core — a redelivered update surfaces as `Ok(None)`, never
//! as an error.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

use rust_decimal::Decimal;
use tracing::debug;

use statewire_types::constants::INBOUND_DEDUP_CACHE_SIZE;
use statewire_types::{
    AssetType, Channel, ChannelId, GatewayMessage, MessageBody, MessageType, NodeConfig, PeerUrl,
    Result, SignedProposal, StatewireError,
};

use crate::bus::MessageBus;

/// Bounded LRU set over `(channel, nonce)` delivery keys.
struct InboundDedup {
    seen: HashSet<(ChannelId, u64)>,
    order: VecDeque<(ChannelId, u64)>,
    max_size: usize,
}

impl InboundDedup {
    fn new(max_size: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(max_size),
            order: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Record a key; returns `false` when it was already present.
    fn record(&mut self, key: (ChannelId, u64)) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.seen.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(key);
        self.order.push_back(key);
        true
    }
}

/// The node's interface to the gateway relay.
pub struct SyncAdapter<B: MessageBus> {
    bus: B,
    local_url: PeerUrl,
    config: NodeConfig,
    dedup: Mutex<InboundDedup>,
}

impl<B: MessageBus> SyncAdapter<B> {
    #[must_use]
    pub fn new(bus: B, local_url: PeerUrl, config: NodeConfig) -> Self {
        Self {
            bus,
            local_url,
            config,
            dedup: Mutex::new(InboundDedup::new(INBOUND_DEDUP_CACHE_SIZE)),
        }
    }

    /// Announce a newly created channel to the counterparty.
    pub fn announce_channel(&self, channel: &Channel, receiver: &PeerUrl) -> Result<()> {
        let message = GatewayMessage {
            message_type: MessageType::RegisterChannel,
            sender: self.local_url.clone(),
            receiver: receiver.clone(),
            channel_name: Some(channel.channel_id),
            message_body: MessageBody::Register {
                asset_type: channel.asset_type.clone(),
                founder_deposit: channel.deposits.get(&channel.founder),
                partner_deposit: channel.deposits.get(&channel.partner),
            },
        };
        self.bus.send(&message)
    }

    /// Announce the channel's current agreed balances at its nonce.
    pub fn announce_balance(&self, channel: &Channel, receiver: &PeerUrl) -> Result<()> {
        let message = GatewayMessage {
            message_type: MessageType::UpdateChannel,
            sender: self.local_url.clone(),
            receiver: receiver.clone(),
            channel_name: Some(channel.channel_id),
            message_body: MessageBody::Update {
                nonce: channel.nonce,
                balance: channel.balances.clone(),
            },
        };
        self.bus.send(&message)
    }

    /// Announce this node's identity, limits and spendable balances to
    /// the relay's directory.
    pub fn sync_wallet(
        &self,
        public_key: &str,
        balances: BTreeMap<AssetType, Decimal>,
    ) -> Result<()> {
        let limits = self
            .config
            .assets
            .values()
            .next()
            .cloned()
            .unwrap_or_default();
        let message = GatewayMessage {
            message_type: MessageType::SyncWallet,
            sender: self.local_url.clone(),
            receiver: "gateway".into(),
            channel_name: None,
            message_body: MessageBody::Wallet {
                public_key: public_key.to_string(),
                commit_min_deposit: limits.min_deposit,
                fee: limits.fee,
                alias: self.config.alias.clone(),
                auto_create: self.config.auto_accept,
                max_channel: self.config.max_channels,
                balance: balances,
            },
        };
        self.bus.send(&message)
    }

    /// Relay a signed proposal to the counterparty.
    pub fn send_proposal(&self, proposal: &SignedProposal, receiver: &PeerUrl) -> Result<()> {
        let message = GatewayMessage {
            message_type: MessageType::TransactionMessage,
            sender: self.local_url.clone(),
            receiver: receiver.clone(),
            channel_name: Some(proposal.channel_id),
            message_body: MessageBody::Transaction {
                proposal: proposal.clone(),
            },
        };
        self.bus.send(&message)
    }

    /// Parse and dedup one raw relay payload.
    ///
    /// `Ok(None)` is a duplicate delivery of a message already handed to
    /// the core; `Err(MalformedMessage)` means the payload matched no
    /// known shape. Wallet and register messages carry no nonce and are
    /// never deduplicated here.
    pub fn handle_inbound(&self, raw: &str) -> Result<Option<GatewayMessage>> {
        let message: GatewayMessage =
            serde_json::from_str(raw).map_err(|e| StatewireError::MalformedMessage {
                reason: e.to_string(),
            })?;

        if let Some(key) = message.dedup_key() {
            if !self.dedup.lock().unwrap().record(key) {
                debug!(channel = %key.0, nonce = key.1, "duplicate delivery dropped");
                return Ok(None);
            }
        }
        Ok(Some(message))
    }

    #[must_use]
    pub fn local_url(&self) -> &PeerUrl {
        &self.local_url
    }
}
