//! Node configuration.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::balance::AssetType;
use crate::constants;
use crate::error::{Result, StatewireError};
use crate::ids::BlockHeight;

/// Per-asset channel limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetLimits {
    /// Minimum collateral one party must commit.
    pub min_deposit: Decimal,
    /// Maximum collateral one party may commit.
    pub max_deposit: Decimal,
    /// Gateway routing fee for this asset.
    pub fee: Decimal,
}

impl Default for AssetLimits {
    fn default() -> Self {
        Self {
            min_deposit: Decimal::from(constants::DEFAULT_MIN_DEPOSIT),
            max_deposit: Decimal::from(constants::DEFAULT_MAX_DEPOSIT),
            fee: Decimal::new(1, 2), // 0.01
        }
    }
}

/// Configuration for a single statewire node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Human-readable node alias announced to the gateway.
    pub alias: String,
    /// Gateway relay endpoint.
    pub gateway_url: String,
    /// Accept inbound channel-creation requests automatically.
    pub auto_accept: bool,
    /// Maximum channels to keep open (0 = unlimited).
    pub max_channels: usize,
    /// Dispute window length in ledger blocks.
    pub dispute_window_blocks: u64,
    /// Extra blocks an HTLC expiration must clear beyond the dispute
    /// window.
    pub htlc_safety_margin_blocks: u64,
    /// Counterparty silence (seconds) before a unilateral close may fire.
    pub liveness_timeout_secs: u64,
    /// Supported assets and their limits.
    pub assets: BTreeMap<AssetType, AssetLimits>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            alias: constants::DEFAULT_NODE_ALIAS.to_string(),
            gateway_url: constants::DEFAULT_GATEWAY_URL.to_string(),
            auto_accept: true,
            max_channels: constants::DEFAULT_MAX_CHANNELS,
            dispute_window_blocks: constants::DEFAULT_DISPUTE_WINDOW_BLOCKS,
            htlc_safety_margin_blocks: constants::DEFAULT_HTLC_SAFETY_MARGIN_BLOCKS,
            liveness_timeout_secs: constants::DEFAULT_LIVENESS_TIMEOUT_SECS,
            assets: BTreeMap::from([("TNC".to_string(), AssetLimits::default())]),
        }
    }
}

impl NodeConfig {
    /// Validate a party's deposit for `asset` against configured limits.
    ///
    /// # Errors
    /// `Configuration` for an unsupported asset, `DepositOutOfRange` for a
    /// non-positive or out-of-bounds amount.
    pub fn validate_deposit(&self, asset: &str, amount: Decimal) -> Result<()> {
        let limits = self
            .assets
            .get(asset)
            .ok_or_else(|| StatewireError::Configuration(format!("unsupported asset: {asset}")))?;
        if amount <= Decimal::ZERO || amount < limits.min_deposit || amount > limits.max_deposit {
            return Err(StatewireError::DepositOutOfRange {
                amount,
                min: limits.min_deposit,
                max: limits.max_deposit,
            });
        }
        Ok(())
    }

    /// Minimum acceptable HTLC expiration for a lock created at `height`:
    /// it must clear the dispute window plus the safety margin.
    #[must_use]
    pub fn min_lock_expiration(&self, height: BlockHeight) -> BlockHeight {
        height
            .saturating_add(self.dispute_window_blocks)
            .saturating_add(self.htlc_safety_margin_blocks)
    }
}
