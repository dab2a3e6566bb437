//! Memoized member resolution

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use peerbridge_sdk::{BridgeResult, MethodId};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Cache of resolved method ids keyed by signature or encoded member token.
///
/// Each key gets its own `OnceCell`, so concurrent requests for the same
/// unresolved key run the resolver once while other keys resolve in
/// parallel. Warm lookups only take the read lock. Failed resolutions are
/// not stored; the next caller tries again.
#[derive(Default)]
pub struct MethodCache {
    entries: RwLock<FxHashMap<String, Arc<OnceCell<MethodId>>>>,
}

impl MethodCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the id cached under `key`, resolving it with `resolve` on first use
    pub fn get_or_resolve<F>(&self, key: &str, resolve: F) -> BridgeResult<MethodId>
    where
        F: FnOnce() -> BridgeResult<MethodId>,
    {
        let cell = self.cell(key);
        if let Some(id) = cell.get() {
            return Ok(*id);
        }
        cell.get_or_try_init(|| -> BridgeResult<MethodId> {
            let id = resolve()?;
            tracing::trace!(
                member = %key.escape_debug(),
                id = id.as_u64(),
                "resolved native member"
            );
            Ok(id)
        })
        .copied()
    }

    /// Get an already resolved id
    pub fn get(&self, key: &str) -> Option<MethodId> {
        self.entries
            .read()
            .get(key)
            .and_then(|cell| cell.get().copied())
    }

    /// Number of resolved entries
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    /// Check if nothing has been resolved
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, key: &str) -> Arc<OnceCell<MethodId>> {
        if let Some(cell) = self.entries.read().get(key) {
            return cell.clone();
        }
        self.entries
            .write()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerbridge_sdk::BridgeError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_resolves_once() {
        let cache = MethodCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let id = cache
                .get_or_resolve("()V", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(MethodId::from_u64(11))
                })
                .unwrap();
            assert_eq!(id, MethodId::from_u64(11));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("()V"), Some(MethodId::from_u64(11)));
    }

    #[test]
    fn test_failure_not_cached() {
        let cache = MethodCache::new();

        let err = cache
            .get_or_resolve("missing", || Err(BridgeError::native("NoSuchMethodError", "missing")))
            .unwrap_err();
        assert!(matches!(err, BridgeError::NativeException { .. }));
        assert!(cache.is_empty());

        let id = cache
            .get_or_resolve("missing", || Ok(MethodId::from_u64(2)))
            .unwrap();
        assert_eq!(id, MethodId::from_u64(2));
    }

    #[test]
    fn test_concurrent_same_key() {
        let cache = Arc::new(MethodCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_resolve("foo\0()V", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(5));
                            Ok(MethodId::from_u64(99))
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), MethodId::from_u64(99));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
