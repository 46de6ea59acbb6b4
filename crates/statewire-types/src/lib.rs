//! # statewire-types
//!
//! Shared types, errors, and configuration for the **statewire**
//! payment-channel core.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`ChannelId`], [`Address`], [`TxId`], [`Signature`]
//! - **Balance model**: [`BalanceSheet`], [`AssetType`]
//! - **HTLC model**: [`HtlcLock`], [`LockHash`], [`Secret`]
//! - **Channel record**: [`Channel`], [`ChannelState`], [`SignaturePair`]
//! - **Proposals**: [`SignedProposal`]
//! - **Gateway messages**: [`GatewayMessage`], [`MessageType`], [`MessageBody`]
//! - **Configuration**: [`NodeConfig`], [`AssetLimits`]
//! - **Errors**: [`StatewireError`] with `SW_ERR_` prefix codes
//! - **Constants**: dispute window, HTLC margins, deposit limits

pub mod balance;
pub mod channel;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod lock;
pub mod message;
pub mod proposal;

// Re-export all primary types at crate root for ergonomic imports:
//   use statewire_types::{Channel, ChannelState, HtlcLock, ...};

pub use balance::*;
pub use channel::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use lock::*;
pub use message::*;
pub use proposal::*;

// Constants are accessed via `statewire_types::constants::FOO`
// (not re-exported to avoid name collisions).
