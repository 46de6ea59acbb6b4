//! Balance accounting for one side of a channel.
//!
//! A [`BalanceSheet`] maps each party address to an amount. The same shape
//! is used for locked collateral (`deposits`) and for the current
//! off-chain-agreed claimable amounts (`balances`); HTLC escrow is held in
//! the channel's lock set, not here.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StatewireError};
use crate::ids::Address;

/// Asset symbol locked in a channel (e.g., "TNC", "NEO").
pub type AssetType = String;

/// Per-party amounts for a single asset.
///
/// Keys are iterated in address order, which keeps any derived encoding
/// deterministic across nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    entries: BTreeMap<Address, Decimal>,
}

impl BalanceSheet {
    /// Create an empty sheet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sheet holding both parties of a channel.
    #[must_use]
    pub fn with_parties(
        founder: Address,
        founder_amount: Decimal,
        partner: Address,
        partner_amount: Decimal,
    ) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(founder, founder_amount);
        entries.insert(partner, partner_amount);
        Self { entries }
    }

    /// Amount held by `party` (zero if absent).
    #[must_use]
    pub fn get(&self, party: &Address) -> Decimal {
        self.entries.get(party).copied().unwrap_or(Decimal::ZERO)
    }

    /// Overwrite the amount held by `party`.
    pub fn set(&mut self, party: Address, amount: Decimal) {
        self.entries.insert(party, amount);
    }

    /// Increase `party`'s amount.
    pub fn credit(&mut self, party: Address, amount: Decimal) {
        *self.entries.entry(party).or_insert(Decimal::ZERO) += amount;
    }

    /// Decrease `party`'s amount, rejecting underflow.
    ///
    /// # Errors
    /// Returns `InsufficientBalance` if the party holds less than `amount`.
    pub fn debit(&mut self, party: Address, amount: Decimal) -> Result<()> {
        let current = self.get(&party);
        if current < amount {
            return Err(StatewireError::InsufficientBalance {
                needed: amount,
                available: current,
            });
        }
        self.entries.insert(party, current - amount);
        Ok(())
    }

    /// Whether `party` holds an entry in this sheet.
    #[must_use]
    pub fn is_party(&self, party: &Address) -> bool {
        self.entries.contains_key(party)
    }

    /// Whether any entry is negative.
    #[must_use]
    pub fn any_negative(&self) -> bool {
        self.entries.values().any(|v| v.is_sign_negative() && !v.is_zero())
    }

    /// Sum of all entries.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.entries.values().copied().sum()
    }

    /// Iterate `(party, amount)` pairs in address order.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Decimal)> {
        self.entries.iter()
    }

    /// The parties listed in this sheet, in address order.
    pub fn parties(&self) -> impl Iterator<Item = &Address> {
        self.entries.keys()
    }

    /// Number of parties listed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no parties are listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
