//! In-memory channel registry.
//!
//! The registry maps channel ids to shared channel handles. Each handle
//! is an `Arc<Mutex<Channel>>`: the registry's own lock is held only for
//! lookup and insertion, while all validation and mutation of a channel
//! happens under that channel's mutex, so operations on different
//! channels never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use rust_decimal::Decimal;
use tracing::info;

use statewire_types::{Address, Channel, ChannelId, ChannelState, Result, StatewireError};

/// Shared handle to one channel; lock it for the duration of any
/// validate-then-commit sequence.
pub type SharedChannel = Arc<Mutex<Channel>>;

/// Lookup and persistence surface for channel records.
///
/// The in-memory [`ChannelRegistry`] is the default implementation;
/// embedders with durable storage put their store behind this trait.
pub trait ChannelRepository {
    /// The channel with this id, if known.
    fn find_by_id(&self, id: &ChannelId) -> Option<SharedChannel>;

    /// All channels between `a` and `b`, in either orientation.
    fn find_by_parties(&self, a: &Address, b: &Address) -> Vec<SharedChannel>;

    /// Register a new channel record.
    fn save(&self, channel: Channel) -> Result<SharedChannel>;
}

/// The default registry, bounded by a configured channel count.
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<ChannelId, SharedChannel>>,
    max_channels: usize,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new(max_channels: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            max_channels,
        }
    }

    /// Number of registered channels (all lifecycle states).
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every registered channel.
    #[must_use]
    pub fn ids(&self) -> Vec<ChannelId> {
        self.channels.read().unwrap().keys().copied().collect()
    }

    /// Drop a terminal channel record. Returns whether it existed.
    pub fn remove(&self, id: &ChannelId) -> bool {
        self.channels.write().unwrap().remove(id).is_some()
    }

    /// Among OPENED channels between `a` and `b`, pick the one best
    /// suited to carry a payment of `amount` from `a`: the channel whose
    /// free balance is sufficient but smallest, so large channels stay
    /// available for large payments.
    #[must_use]
    pub fn choose_channel(&self, a: &Address, b: &Address, amount: Decimal) -> Option<SharedChannel> {
        self.find_by_parties(a, b)
            .into_iter()
            .filter_map(|handle| {
                let free = {
                    let ch = handle.lock().unwrap();
                    if ch.state != ChannelState::Opened {
                        return None;
                    }
                    ch.free_balance(a)
                };
                (free >= amount).then_some((free, handle))
            })
            .min_by_key(|(free, _)| *free)
            .map(|(_, handle)| handle)
    }
}

impl ChannelRepository for ChannelRegistry {
    fn find_by_id(&self, id: &ChannelId) -> Option<SharedChannel> {
        self.channels.read().unwrap().get(id).cloned()
    }

    fn find_by_parties(&self, a: &Address, b: &Address) -> Vec<SharedChannel> {
        self.channels
            .read()
            .unwrap()
            .values()
            .filter(|handle| handle.lock().unwrap().is_between(a, b))
            .cloned()
            .collect()
    }

    fn save(&self, channel: Channel) -> Result<SharedChannel> {
        let mut channels = self.channels.write().unwrap();
        if channels.len() >= self.max_channels {
            return Err(StatewireError::Configuration(format!(
                "channel limit reached ({} max)",
                self.max_channels
            )));
        }
        if channels.contains_key(&channel.channel_id) {
            return Err(StatewireError::ChannelExists {
                founder: channel.founder,
                partner: channel.partner,
            });
        }
        info!(
            channel = %channel.channel_id,
            founder = %channel.founder,
            partner = %channel.partner,
            "registered channel"
        );
        let id = channel.channel_id;
        let handle = Arc::new(Mutex::new(channel));
        channels.insert(id, Arc::clone(&handle));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::mark_opened;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    fn opened(a: Address, b: Address, deposit: Decimal) -> Channel {
        let mut ch = Channel::open(a, b, "TNC", deposit, deposit);
        mark_opened(&mut ch).unwrap();
        ch
    }

    #[test]
    fn save_and_find() {
        let registry = ChannelRegistry::new(10);
        let ch = opened(addr(1), addr(2), dec(50));
        let id = ch.channel_id;
        registry.save(ch).unwrap();

        assert!(registry.find_by_id(&id).is_some());
        assert_eq!(registry.find_by_parties(&addr(1), &addr(2)).len(), 1);
        // Either orientation finds the same channel.
        assert_eq!(registry.find_by_parties(&addr(2), &addr(1)).len(), 1);
        assert!(registry.find_by_parties(&addr(1), &addr(3)).is_empty());
    }

    #[test]
    fn channel_limit_enforced() {
        let registry = ChannelRegistry::new(1);
        registry.save(opened(addr(1), addr(2), dec(10))).unwrap();
        let err = registry.save(opened(addr(3), addr(4), dec(10))).unwrap_err();
        assert!(matches!(err, StatewireError::Configuration(_)));
    }

    #[test]
    fn duplicate_id_rejected() {
        let registry = ChannelRegistry::new(10);
        let ch = opened(addr(1), addr(2), dec(10));
        registry.save(ch.clone()).unwrap();
        let err = registry.save(ch).unwrap_err();
        assert!(matches!(err, StatewireError::ChannelExists { .. }));
    }

    #[test]
    fn choose_channel_prefers_best_fit() {
        let registry = ChannelRegistry::new(10);
        let small = opened(addr(1), addr(2), dec(20));
        let large = opened(addr(1), addr(2), dec(500));
        let small_id = small.channel_id;
        registry.save(small).unwrap();
        registry.save(large).unwrap();

        // Fits in both; the smaller channel is chosen.
        let chosen = registry.choose_channel(&addr(1), &addr(2), dec(15)).unwrap();
        assert_eq!(chosen.lock().unwrap().channel_id, small_id);

        // Only fits in the large one.
        let chosen = registry.choose_channel(&addr(1), &addr(2), dec(100)).unwrap();
        assert_ne!(chosen.lock().unwrap().channel_id, small_id);

        // Fits in none.
        assert!(registry.choose_channel(&addr(1), &addr(2), dec(1000)).is_none());
    }

    #[test]
    fn choose_channel_skips_non_opened() {
        let registry = ChannelRegistry::new(10);
        let ch = Channel::open(addr(1), addr(2), "TNC", dec(50), dec(50)); // still INIT
        registry.save(ch).unwrap();
        assert!(registry.choose_channel(&addr(1), &addr(2), dec(10)).is_none());
    }

    #[test]
    fn remove_terminal_record() {
        let registry = ChannelRegistry::new(10);
        let ch = opened(addr(1), addr(2), dec(10));
        let id = ch.channel_id;
        registry.save(ch).unwrap();
        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(registry.is_empty());
    }
}
