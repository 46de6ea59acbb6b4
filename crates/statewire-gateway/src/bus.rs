//! Transport abstraction for the gateway relay.

use statewire_types::{GatewayMessage, Result};

/// Delivers protocol messages to the gateway relay.
///
/// Delivery is at-least-once: the relay may redeliver, so everything
/// sent through here must be safe to receive twice. Implementations
/// report transport failures as
/// [`StatewireError::GatewayUnreachable`](statewire_types::StatewireError::GatewayUnreachable).
pub trait MessageBus {
    /// Hand `message` to the relay for delivery to its receiver.
    fn send(&self, message: &GatewayMessage) -> Result<()>;
}
