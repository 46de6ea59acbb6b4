//! # statewire-channel
//!
//! The off-chain heart of statewire: validating and applying dual-signed
//! balance updates, running the HTLC conditional-transfer sub-protocol,
//! enforcing the channel lifecycle, and holding the in-memory channel
//! registry.
//!
//! All state-mutating entry points take `&mut Channel` and are called
//! with the channel's mutex held, so every proposal for a given channel
//! is validated and applied atomically against the same snapshot.
//! Validation is all-or-nothing: a proposal that fails any check leaves
//! the channel untouched.

pub mod apply;
pub mod htlc;
pub mod lifecycle;
pub mod registry;

pub use apply::{commit_proposal, countersign, propose_transfer, validate_proposal};
pub use htlc::{propose_lock, propose_lock_expiry, propose_reveal};
pub use lifecycle::{
    begin_close, challenge, mark_closed, mark_opened, mark_settled, transition,
};
pub use registry::{ChannelRegistry, ChannelRepository, SharedChannel};
