//! Registry of managed peers by native identity

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use peerbridge_sdk::NativeIdentity;
use std::sync::{Arc, Weak};

/// Process-wide map from native identity to the single managed peer that
/// currently owns it.
///
/// Entries hold weak pointers so a registered peer can still be collected
/// on the managed side. An entry whose peer is gone is treated as absent.
/// Insert-if-absent is atomic with respect to `lookup` and `remove` because
/// all three go through the same shard lock.
pub struct HandleTable<T> {
    entries: DashMap<NativeIdentity, Weak<T>>,
}

impl<T> HandleTable<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Create an empty table sized for `capacity` peers
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
        }
    }

    /// Register `peer` as the owner of `identity`.
    ///
    /// Returns false, leaving the table unchanged, if a live peer already
    /// owns the identity.
    pub fn try_register(&self, identity: NativeIdentity, peer: &Arc<T>) -> bool {
        match self.entries.entry(identity) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().strong_count() > 0 {
                    return false;
                }
                // Previous owner is mid-finalization; its removal is owner-checked.
                occupied.insert(Arc::downgrade(peer));
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::downgrade(peer));
                true
            }
        }
    }

    /// Get the live peer registered for `identity`
    pub fn lookup(&self, identity: NativeIdentity) -> Option<Arc<T>> {
        self.entries.get(&identity).and_then(|entry| entry.upgrade())
    }

    /// Check whether a live peer is registered for `identity`
    pub fn contains(&self, identity: NativeIdentity) -> bool {
        self.lookup(identity).is_some()
    }

    /// Remove the entry for `identity`, whoever owns it. No-op if absent.
    pub fn remove(&self, identity: NativeIdentity) {
        self.entries.remove(&identity);
    }

    /// Remove the entry for `identity` only if it points at `peer`.
    ///
    /// Returns true if an entry was removed.
    pub fn remove_owned(&self, identity: NativeIdentity, peer: &T) -> bool {
        let peer = peer as *const T;
        self.entries
            .remove_if(&identity, |_, owner| std::ptr::eq(owner.as_ptr(), peer))
            .is_some()
    }

    /// Number of entries, including ones whose peer is being finalized
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all live registered peers
    pub fn live(&self) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect()
    }

    /// All identities with a live peer
    pub fn identities(&self) -> Vec<NativeIdentity> {
        self.entries
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .map(|entry| *entry.key())
            .collect()
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
