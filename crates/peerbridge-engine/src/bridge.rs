//! The bridge context
//!
//! `PeerBridge` owns everything that is process-scoped on the managed side:
//! the handle table, the per-type member caches and the marshal table. It is
//! an explicit value so tests can build isolated bridges; hosts that want a
//! single ambient instance can install one with `install_global`.

use crate::handle::ReferenceHandle;
use crate::marshal::{ArgumentMarshalUnit, MarshalRegistry};
use crate::members::{find_peer_type, MemberEnv, PeerMembers};
use crate::options::BridgeOptions;
use crate::peer::{Ownership, PeerObject};
use crate::table::HandleTable;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use peerbridge_sdk::{
    BridgeError, BridgeResult, ManagedType, NativeIdentity, NativeReference, NativeRuntime,
    TypeMetadataProvider,
};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

static GLOBAL_BRIDGE: OnceCell<PeerBridge> = OnceCell::new();

struct BridgeInner {
    options: BridgeOptions,
    env: MemberEnv,
    table: HandleTable<PeerObject>,
    marshal: MarshalRegistry,
    members: RwLock<FxHashMap<&'static str, Arc<OnceCell<Arc<PeerMembers>>>>>,
}

/// Shared handle to a bridge context. Cloning is cheap.
#[derive(Clone)]
pub struct PeerBridge {
    inner: Arc<BridgeInner>,
}

impl PeerBridge {
    /// Create a bridge with default options
    pub fn new(
        runtime: Arc<dyn NativeRuntime>,
        metadata: Arc<dyn TypeMetadataProvider>,
    ) -> Self {
        Self::with_options(runtime, metadata, BridgeOptions::default())
    }

    /// Create a bridge with explicit options
    pub fn with_options(
        runtime: Arc<dyn NativeRuntime>,
        metadata: Arc<dyn TypeMetadataProvider>,
        options: BridgeOptions,
    ) -> Self {
        let new_object_required = options.new_object_required(runtime.new_object_required());
        tracing::debug!(
            bridge = %options.name,
            new_object_required,
            "creating peer bridge"
        );
        Self {
            inner: Arc::new(BridgeInner {
                table: HandleTable::with_capacity(options.handle_table_capacity),
                env: MemberEnv {
                    runtime,
                    metadata,
                    new_object_required,
                },
                marshal: MarshalRegistry::with_builtins(),
                members: RwLock::new(FxHashMap::default()),
                options,
            }),
        }
    }

    /// Install `bridge` as the process-wide instance.
    ///
    /// Fails, handing the bridge back, if one is already installed.
    pub fn install_global(bridge: PeerBridge) -> Result<(), PeerBridge> {
        GLOBAL_BRIDGE.set(bridge)
    }

    /// The process-wide instance, if one was installed
    pub fn global() -> Option<&'static PeerBridge> {
        GLOBAL_BRIDGE.get()
    }

    /// Bridge name from the options
    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    /// Options the bridge was created with
    pub fn options(&self) -> &BridgeOptions {
        &self.inner.options
    }

    /// Native runtime
    pub fn runtime(&self) -> &Arc<dyn NativeRuntime> {
        &self.inner.env.runtime
    }

    /// Type metadata provider
    pub fn metadata(&self) -> &Arc<dyn TypeMetadataProvider> {
        &self.inner.env.metadata
    }

    /// Whether objects are created in a single `new_object` step
    pub fn new_object_required(&self) -> bool {
        self.inner.env.new_object_required
    }

    /// Registry of peers by native identity
    pub fn handle_table(&self) -> &HandleTable<PeerObject> {
        &self.inner.table
    }

    /// Marshal strategies by managed type
    pub fn marshal_registry(&self) -> &MarshalRegistry {
        &self.inner.marshal
    }

    /// Check whether two handles point at the same bridge
    pub fn ptr_eq(&self, other: &PeerBridge) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Take ownership of a reference returned by the runtime
    pub fn adopt(&self, reference: NativeReference) -> BridgeResult<ReferenceHandle> {
        ReferenceHandle::from_owned_checked(self.runtime().clone(), reference)
    }

    /// Members for `ty`.
    ///
    /// These are the members of the nearest type in `ty`'s ancestry that
    /// declares a native peer, created on first use and cached for the life
    /// of the bridge.
    pub fn members_for(&self, ty: &'static ManagedType) -> BridgeResult<Arc<PeerMembers>> {
        let (declaring, _) = find_peer_type(self.metadata().as_ref(), ty).ok_or_else(|| {
            BridgeError::NotSupported(format!(
                "Cannot create instance of type '{}': no native peer type found.",
                ty
            ))
        })?;

        let cell = self.members_cell(declaring);
        cell.get_or_try_init(|| {
            PeerMembers::new(self.inner.env.clone(), declaring).map(Arc::new)
        })
        .cloned()
    }

    /// Per-type slot in the member cache. The map lock is only held to find
    /// or insert the slot, never while the native class is resolved.
    fn members_cell(&self, declaring: &'static ManagedType) -> Arc<OnceCell<Arc<PeerMembers>>> {
        if let Some(cell) = self.inner.members.read().get(declaring.name()) {
            return cell.clone();
        }
        self.inner
            .members
            .write()
            .entry(declaring.name())
            .or_default()
            .clone()
    }

    /// Registered peer for `identity`, without registering anything
    pub fn peek_identity(&self, identity: NativeIdentity) -> Option<Arc<PeerObject>> {
        self.inner.table.lookup(identity)
    }

    /// Registered peer for the object behind `handle`, without registering
    /// anything
    pub fn peek_registered(
        &self,
        handle: &ReferenceHandle,
    ) -> BridgeResult<Option<Arc<PeerObject>>> {
        Ok(self.peek_identity(handle.identity()?))
    }

    /// Peer for the object behind `handle`, creating and registering one
    /// if none is registered yet.
    ///
    /// An existing peer always wins over a new wrapper; with `Transfer` the
    /// handed-in slot is then released. If another thread registers the same
    /// object first, its peer is returned and the local wrapper discarded.
    pub fn resolve_or_wrap(
        &self,
        ty: &'static ManagedType,
        handle: &mut ReferenceHandle,
        ownership: Ownership,
    ) -> BridgeResult<Arc<PeerObject>> {
        let reference = handle.reference().map_err(|_| {
            BridgeError::ArgumentInvalid("Cannot resolve a disposed reference handle".to_string())
        })?;
        if reference.is_null() {
            return Err(BridgeError::ArgumentInvalid(
                "Cannot resolve a null native reference".to_string(),
            ));
        }
        let identity = handle.identity()?;
        if let Some(existing) = self.inner.table.lookup(identity) {
            tracing::trace!(bridge = %self.name(), %identity, "resolved existing peer");
            if ownership == Ownership::Transfer {
                handle.dispose();
            }
            return Ok(existing);
        }

        let peer = PeerObject::wrap(self, ty, handle, ownership)?;
        match peer.register_with_runtime() {
            Ok(()) => Ok(peer),
            Err(err) => {
                let winner = if err.is_not_supported() {
                    self.inner.table.lookup(identity)
                } else {
                    None
                };
                if let Err(release_err) = peer.dispose() {
                    tracing::warn!(error = %release_err, "failed to release discarded wrapper");
                }
                winner.ok_or(err)
            }
        }
    }

    /// All live registered peers
    pub fn surfaced_objects(&self) -> Vec<Arc<PeerObject>> {
        self.inner.table.live()
    }

    /// Number of live registered peers
    pub fn surfaced_count(&self) -> usize {
        self.inner.table.identities().len()
    }

    /// Package `value` as a native call argument
    pub fn marshal<T: 'static>(&self, value: &T) -> BridgeResult<ArgumentMarshalUnit<T>> {
        ArgumentMarshalUnit::new(self, value)
    }
}

impl fmt::Debug for PeerBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerBridge")
            .field("name", &self.inner.options.name)
            .field("new_object_required", &self.inner.env.new_object_required)
            .field("registered", &self.inner.table.len())
            .field("member_types", &self.inner.members.read().len())
            .finish()
    }
}
