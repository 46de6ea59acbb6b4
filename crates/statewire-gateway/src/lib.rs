//! # statewire-gateway
//!
//! Adapter between the channel core and the external gateway relay that
//! carries protocol messages between peers. The [`bus`] trait abstracts
//! the transport; the [`sync`] adapter builds outbound announcements and
//! normalizes inbound traffic, absorbing the relay's at-least-once
//! delivery so duplicates never reach the channel core.

pub mod bus;
pub mod sync;

pub use bus::MessageBus;
pub use sync::SyncAdapter;
