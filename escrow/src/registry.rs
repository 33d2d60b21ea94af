//! Channel registry keyed by channel digest.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use channelpay_common::{Amount, ChannelKey};

use crate::channel::Channel;

/// A channel record behind its serialization lock.
pub type ChannelSlot = Arc<Mutex<Channel>>;

/// Exclusive access to one channel for the duration of an operation.
///
/// Dropping a guard whose record is still the zero record removes the slot
/// again, unless another task is waiting on it, so rejected operations leave
/// no storage behind.
pub struct ChannelGuard<'a> {
    key: ChannelKey,
    guard: Option<OwnedMutexGuard<Channel>>,
    channels: &'a DashMap<ChannelKey, ChannelSlot>,
}

impl Deref for ChannelGuard<'_> {
    type Target = Channel;

    fn deref(&self) -> &Channel {
        match &self.guard {
            Some(guard) => guard,
            None => unreachable!("channel guard used after release"),
        }
    }
}

impl DerefMut for ChannelGuard<'_> {
    fn deref_mut(&mut self) -> &mut Channel {
        match &mut self.guard {
            Some(guard) => guard,
            None => unreachable!("channel guard used after release"),
        }
    }
}

impl Drop for ChannelGuard<'_> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let pristine = guard.is_pristine();
        // Releases this guard's reference to the slot.
        drop(guard);

        if pristine {
            // Under the shard lock no one can clone the slot, so a count of
            // one means no task holds or awaits it.
            let removed = self.channels.remove_if(&self.key, |_, slot| {
                Arc::strong_count(slot) == 1
                    && slot.try_lock().map(|c| c.is_pristine()).unwrap_or(false)
            });
            if removed.is_some() {
                debug!(digest = %self.key, "Zero channel record discarded");
            }
        }
    }
}

/// Registry of all channel records.
///
/// Each record has its own async mutex. A mutating operation holds it across
/// the token call and the commit, which totally orders operations on one
/// digest while leaving other digests independent.
pub struct ChannelRegistry {
    /// Channel slots by digest.
    channels: DashMap<ChannelKey, ChannelSlot>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Lock a channel, creating its zero record on first access.
    pub async fn acquire(&self, key: ChannelKey) -> ChannelGuard<'_> {
        let slot = self
            .channels
            .entry(key)
            .or_insert_with(|| {
                debug!(digest = %key, "Channel record created");
                Arc::new(Mutex::new(Channel::default()))
            })
            .clone();

        ChannelGuard {
            key,
            guard: Some(slot.lock_owned().await),
            channels: &self.channels,
        }
    }

    /// Read a channel. Unknown digests read as the zero record and are not
    /// inserted.
    pub async fn snapshot(&self, key: &ChannelKey) -> Channel {
        let slot = self.channels.get(key).map(|s| s.clone());
        match slot {
            Some(slot) => *slot.lock().await,
            None => Channel::default(),
        }
    }

    /// Read every known channel.
    pub async fn snapshot_all(&self) -> Vec<(ChannelKey, Channel)> {
        let slots: Vec<(ChannelKey, ChannelSlot)> = self
            .channels
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut channels = Vec::with_capacity(slots.len());
        for (key, slot) in slots {
            channels.push((key, *slot.lock().await));
        }
        channels
    }

    /// Sum of escrowed amounts across all channels.
    pub async fn total_locked(&self) -> Amount {
        self.snapshot_all()
            .await
            .iter()
            .map(|(_, channel)| channel.locked)
            .fold(0, Amount::saturating_add)
    }

    /// Lock every known channel, in digest order.
    ///
    /// Operations hold at most one channel lock, so taking them all in a
    /// fixed order cannot deadlock.
    pub async fn lock_all(&self) -> Vec<(ChannelKey, OwnedMutexGuard<Channel>)> {
        let mut slots: Vec<(ChannelKey, ChannelSlot)> = self
            .channels
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));

        let mut guards = Vec::with_capacity(slots.len());
        for (key, slot) in slots {
            guards.push((key, slot.lock_owned().await));
        }
        guards
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Check if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
