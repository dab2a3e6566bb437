//! Startup-populated native peer name table

use parking_lot::RwLock;
use peerbridge_sdk::{ManagedType, TypeMetadataProvider};
use rustc_hash::FxHashMap;

/// `TypeMetadataProvider` backed by an explicit table.
///
/// Entries are added while the host registers its bindings, normally at
/// startup. Only declared peers are stored; inherited ones are found by
/// the resolvers walking the managed ancestry.
#[derive(Default)]
pub struct TypeMap {
    peers: RwLock<FxHashMap<&'static str, String>>,
}

impl TypeMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `register`
    pub fn with(self, ty: &'static ManagedType, native_name: impl Into<String>) -> Self {
        self.register(ty, native_name);
        self
    }

    /// Declare `native_name` as the native peer of `ty`.
    ///
    /// Returns the previous declaration if one was replaced.
    pub fn register(
        &self,
        ty: &'static ManagedType,
        native_name: impl Into<String>,
    ) -> Option<String> {
        self.peers.write().insert(ty.name(), native_name.into())
    }

    /// Number of declared peers
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Check if no peers are declared
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

impl TypeMetadataProvider for TypeMap {
    fn native_peer_name(&self, ty: &ManagedType) -> Option<String> {
        self.peers.read().get(ty.name()).cloned()
    }
}
