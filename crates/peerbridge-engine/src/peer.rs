//! Managed peer objects and their registration state machine
//!
//! A `PeerObject` is the managed-side representative of one native object.
//! It starts `Unregistered`, holding a local or caller-supplied reference.
//! `register_with_runtime` promotes that reference to a shared one and
//! records the peer in the bridge's `HandleTable`, after which the native
//! object survives native collections and can be found again by identity.
//!
//! Both terminal transitions (explicit `dispose` and drop-driven
//! finalization) remove the table entry before releasing the native slot.

use crate::bridge::PeerBridge;
use crate::handle::ReferenceHandle;
use crate::members::PeerMembers;
use parking_lot::Mutex;
use peerbridge_sdk::{
    BridgeError, BridgeResult, ManagedType, NativeIdentity, NativeReference, NativeValue, RefKind,
};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Who owns a reference handed to the bridge
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// The new peer takes the slot; the caller's handle becomes invalid
    Transfer,
    /// The new peer duplicates the slot; the caller keeps the original
    DoNotTransfer,
}

/// Observable peer state
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PeerStatus {
    /// Holds a local or caller-supplied reference, absent from the table
    Unregistered,
    /// Holds a shared reference and owns its table entry
    Registered,
    /// Released by an explicit `dispose`
    Disposed,
    /// Released by finalization
    Finalized,
}

/// Callbacks fired when a live peer reaches a terminal state
pub trait PeerHooks: Send + Sync {
    /// Called after an explicit `dispose` released the peer
    fn disposed(&self) {}

    /// Called after finalization released the peer. Panics are caught.
    fn finalized(&self) {}
}

enum PeerState {
    Unregistered(ReferenceHandle),
    Registered {
        handle: ReferenceHandle,
        identity: NativeIdentity,
    },
    Disposed,
    Finalized,
}

/// Managed representative of one native object
pub struct PeerObject {
    bridge: PeerBridge,
    managed_type: &'static ManagedType,
    state: Mutex<PeerState>,
    hooks: Option<Arc<dyn PeerHooks>>,
}

impl PeerObject {
    pub(crate) fn from_handle(
        bridge: PeerBridge,
        managed_type: &'static ManagedType,
        handle: ReferenceHandle,
        hooks: Option<Arc<dyn PeerHooks>>,
    ) -> Self {
        Self {
            bridge,
            managed_type,
            state: Mutex::new(PeerState::Unregistered(handle)),
            hooks,
        }
    }

    /// Construct a new native object of `managed_type`'s peer type.
    ///
    /// The constructor is picked by `constructor_signature` on the resolver
    /// for `managed_type`, which may inherit its native type from a managed
    /// ancestor. The new peer is unregistered.
    pub fn create(
        bridge: &PeerBridge,
        managed_type: &'static ManagedType,
        constructor_signature: &str,
        args: &[NativeValue],
    ) -> BridgeResult<Arc<PeerObject>> {
        Self::create_inner(bridge, managed_type, constructor_signature, args, None)
    }

    /// `create` with lifecycle hooks attached
    pub fn create_with_hooks(
        bridge: &PeerBridge,
        managed_type: &'static ManagedType,
        constructor_signature: &str,
        args: &[NativeValue],
        hooks: Arc<dyn PeerHooks>,
    ) -> BridgeResult<Arc<PeerObject>> {
        Self::create_inner(bridge, managed_type, constructor_signature, args, Some(hooks))
    }

    fn create_inner(
        bridge: &PeerBridge,
        managed_type: &'static ManagedType,
        constructor_signature: &str,
        args: &[NativeValue],
        hooks: Option<Arc<dyn PeerHooks>>,
    ) -> BridgeResult<Arc<PeerObject>> {
        let members = bridge.members_for(managed_type)?;
        let instance = members.instance();

        let handle = instance.start_create_instance(constructor_signature, managed_type, args)?;
        let peer = Arc::new(Self::from_handle(bridge.clone(), managed_type, handle, hooks));

        let target = peer.reference()?;
        if let Err(err) =
            instance.finish_create_instance(constructor_signature, managed_type, target, args)
        {
            peer.abandon();
            return Err(err);
        }
        Ok(peer)
    }

    /// Wrap an existing native reference in a new, unregistered peer.
    ///
    /// With `Transfer` the slot moves out of `handle`, leaving it invalid.
    /// With `DoNotTransfer` a new slot of the same strength is allocated.
    /// A weak reference is upgraded to a local one first.
    pub fn wrap(
        bridge: &PeerBridge,
        managed_type: &'static ManagedType,
        handle: &mut ReferenceHandle,
        ownership: Ownership,
    ) -> BridgeResult<Arc<PeerObject>> {
        let reference = handle.reference().map_err(|_| {
            BridgeError::ArgumentInvalid("Cannot wrap a disposed reference handle".to_string())
        })?;
        if reference.is_null() {
            return Err(BridgeError::ArgumentInvalid(
                "Cannot wrap a null native reference".to_string(),
            ));
        }

        let owned = match (reference.kind(), ownership) {
            (RefKind::Weak, _) => {
                let local = handle.upgrade()?.ok_or_else(|| {
                    BridgeError::ArgumentInvalid(
                        "Weakly referenced native object has been collected".to_string(),
                    )
                })?;
                if ownership == Ownership::Transfer {
                    handle.dispose();
                }
                local
            }
            (_, Ownership::Transfer) => handle.take()?,
            (_, Ownership::DoNotTransfer) => handle.duplicate()?,
        };

        Ok(Arc::new(Self::from_handle(
            bridge.clone(),
            managed_type,
            owned,
            None,
        )))
    }

    /// Bridge this peer belongs to
    pub fn bridge(&self) -> &PeerBridge {
        &self.bridge
    }

    /// Managed type of this peer
    pub fn managed_type(&self) -> &'static ManagedType {
        self.managed_type
    }

    /// Members declared for this peer's managed type
    pub fn members(&self) -> BridgeResult<Arc<PeerMembers>> {
        self.bridge.members_for(self.managed_type)
    }

    /// Current state
    pub fn status(&self) -> PeerStatus {
        match &*self.state.lock() {
            PeerState::Unregistered(_) => PeerStatus::Unregistered,
            PeerState::Registered { .. } => PeerStatus::Registered,
            PeerState::Disposed => PeerStatus::Disposed,
            PeerState::Finalized => PeerStatus::Finalized,
        }
    }

    /// Check whether the peer reached a terminal state
    pub fn is_disposed(&self) -> bool {
        matches!(
            self.status(),
            PeerStatus::Disposed | PeerStatus::Finalized
        )
    }

    /// Check whether the peer owns a table entry
    pub fn is_registered(&self) -> bool {
        self.status() == PeerStatus::Registered
    }

    /// Identity under which the peer is registered, if it is
    pub fn registered_identity(&self) -> Option<NativeIdentity> {
        match &*self.state.lock() {
            PeerState::Registered { identity, .. } => Some(*identity),
            _ => None,
        }
    }

    fn with_handle<R>(
        &self,
        f: impl FnOnce(&ReferenceHandle) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        match &*self.state.lock() {
            PeerState::Unregistered(handle) | PeerState::Registered { handle, .. } => f(handle),
            PeerState::Disposed | PeerState::Finalized => Err(self.disposed_error()),
        }
    }

    fn disposed_error(&self) -> BridgeError {
        BridgeError::disposed(format!("PeerObject<{}>", self.managed_type))
    }

    /// Reference currently held by the peer
    pub fn reference(&self) -> BridgeResult<NativeReference> {
        self.with_handle(|handle| handle.reference())
    }

    /// Strength class of the held reference
    pub fn ref_kind(&self) -> BridgeResult<RefKind> {
        self.with_handle(|handle| handle.kind())
    }

    /// New local reference to the native object, owned by the caller
    pub fn new_local_ref(&self) -> BridgeResult<ReferenceHandle> {
        self.with_handle(|handle| handle.new_local_ref())
    }

    /// Native identity of the object
    pub fn identity(&self) -> BridgeResult<NativeIdentity> {
        self.with_handle(|handle| handle.identity())
    }

    /// Check whether both peers represent the same native object
    pub fn same_object(&self, other: &PeerObject) -> BridgeResult<bool> {
        let theirs = other.new_local_ref()?;
        self.with_handle(|handle| handle.same_object(&theirs))
    }

    /// Invoke an instance method given as a `name\0signature` token.
    ///
    /// The call runs on a temporary local reference so the peer's own state
    /// is not locked while native code executes.
    pub fn invoke(&self, encoded_member: &str, args: &[NativeValue]) -> BridgeResult<NativeValue> {
        let target = self.new_local_ref()?;
        let method = self.members()?.instance().get_method(encoded_member)?;
        self.bridge
            .runtime()
            .call_method(target.reference()?, method, args)
    }

    /// Make the peer survive native collections and discoverable by identity.
    ///
    /// Valid only while unregistered. The held reference is promoted to a
    /// shared one first. If another peer already owns the native identity
    /// the call fails with `NotSupported`, the table is left unchanged and
    /// this peer stays unregistered, holding the promoted reference until it
    /// is disposed.
    pub fn register_with_runtime(self: &Arc<Self>) -> BridgeResult<()> {
        let mut state = self.state.lock();
        let handle = match &mut *state {
            PeerState::Unregistered(handle) => handle,
            PeerState::Registered { identity, .. } => {
                return Err(BridgeError::InvalidOperation(format!(
                    "Peer of type '{}' is already registered as {}",
                    self.managed_type, identity
                )))
            }
            PeerState::Disposed | PeerState::Finalized => return Err(self.disposed_error()),
        };

        if handle.kind()? != RefKind::Shared {
            let shared = handle.new_shared_ref()?;
            let mut local = std::mem::replace(handle, shared);
            local.dispose();
        }

        let identity = handle.identity()?;
        if !self.bridge.handle_table().try_register(identity, self) {
            tracing::debug!(
                bridge = %self.bridge.name(),
                managed_type = self.managed_type.name(),
                %identity,
                "rejected duplicate peer registration"
            );
            return Err(BridgeError::NotSupported(format!(
                "Duplicate native object registration: {} is already owned by another peer",
                identity
            )));
        }

        if let PeerState::Unregistered(handle) = std::mem::replace(&mut *state, PeerState::Disposed)
        {
            *state = PeerState::Registered { handle, identity };
        }
        tracing::debug!(
            bridge = %self.bridge.name(),
            managed_type = self.managed_type.name(),
            %identity,
            "registered peer"
        );
        Ok(())
    }

    /// Release the peer. Repeated calls are no-ops.
    ///
    /// The table entry is removed before the native slot is released. A
    /// failure reported by the runtime while releasing is returned, but the
    /// peer is disposed regardless.
    pub fn dispose(&self) -> BridgeResult<()> {
        let released = self.release(PeerState::Disposed);
        if !matches!(released, Ok(false)) {
            if let Some(hooks) = &self.hooks {
                hooks.disposed();
            }
        }
        released.map(|_| ())
    }

    /// Finalization path: same release as `dispose`, but nothing escapes.
    fn dispose_from_collector(&self) {
        let released = match self.release(PeerState::Finalized) {
            Ok(released) => released,
            Err(err) => {
                tracing::warn!(
                    bridge = %self.bridge.name(),
                    managed_type = self.managed_type.name(),
                    error = %err,
                    "error releasing finalized peer"
                );
                true
            }
        };
        if !released {
            return;
        }
        if let Some(hooks) = &self.hooks {
            if catch_unwind(AssertUnwindSafe(|| hooks.finalized())).is_err() {
                tracing::warn!(
                    managed_type = self.managed_type.name(),
                    "peer finalization hook panicked"
                );
            }
        }
    }

    /// Release after a failed construction, without running hooks
    fn abandon(&self) {
        if let Err(err) = self.release(PeerState::Disposed) {
            tracing::warn!(error = %err, "error releasing partially constructed peer");
        }
    }

    /// Move to `terminal`, deregistering and then releasing the slot.
    ///
    /// Returns false if the peer was already in a terminal state.
    fn release(&self, terminal: PeerState) -> BridgeResult<bool> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, terminal) {
            PeerState::Registered {
                mut handle,
                identity,
            } => {
                self.bridge.handle_table().remove_owned(identity, self);
                tracing::debug!(
                    bridge = %self.bridge.name(),
                    managed_type = self.managed_type.name(),
                    %identity,
                    "deregistered peer"
                );
                handle.release().map(|_| true)
            }
            PeerState::Unregistered(mut handle) => handle.release().map(|_| true),
            previous => {
                *state = previous;
                Ok(false)
            }
        }
    }
}

impl Drop for PeerObject {
    fn drop(&mut self) {
        self.dispose_from_collector();
    }
}

impl fmt::Debug for PeerObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerObject")
            .field("managed_type", &self.managed_type.name())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeMap;
    use peerbridge_test::FakeRuntime;
    use std::sync::atomic::{AtomicBool, Ordering};

    static OBJECT: ManagedType = ManagedType::root("Test.Object");

    fn bridge() -> (Arc<FakeRuntime>, PeerBridge) {
        let fake = Arc::new(FakeRuntime::new());
        let types = TypeMap::new().with(&OBJECT, "java/lang/Object");
        let bridge = PeerBridge::new(fake.clone(), Arc::new(types));
        (fake, bridge)
    }

    #[derive(Default)]
    struct Flags {
        disposed: AtomicBool,
        finalized: AtomicBool,
    }

    impl PeerHooks for Flags {
        fn disposed(&self) {
            self.disposed.store(true, Ordering::SeqCst);
        }

        fn finalized(&self) {
            self.finalized.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_create_starts_unregistered_local() {
        let (_fake, bridge) = bridge();
        let peer = PeerObject::create(&bridge, &OBJECT, "()V", &[]).unwrap();

        assert_eq!(peer.status(), PeerStatus::Unregistered);
        assert_eq!(peer.ref_kind().unwrap(), RefKind::Local);
        assert!(peer.registered_identity().is_none());
    }

    #[test]
    fn test_register_promotes_to_shared() {
        let (fake, bridge) = bridge();
        let peer = PeerObject::create(&bridge, &OBJECT, "()V", &[]).unwrap();
        let local_raw = peer.reference().unwrap().raw();

        peer.register_with_runtime().unwrap();

        assert_eq!(peer.status(), PeerStatus::Registered);
        assert_eq!(peer.ref_kind().unwrap(), RefKind::Shared);
        assert_ne!(peer.reference().unwrap().raw(), local_raw);
        assert!(fake.released().iter().any(|r| r.raw() == local_raw));
    }

    #[test]
    fn test_register_twice_is_invalid() {
        let (_fake, bridge) = bridge();
        let peer = PeerObject::create(&bridge, &OBJECT, "()V", &[]).unwrap();
        peer.register_with_runtime().unwrap();

        let err = peer.register_with_runtime().unwrap_err();
        assert!(matches!(err, BridgeError::InvalidOperation(_)));
        assert_eq!(bridge.surfaced_count(), 1);
    }

    #[test]
    fn test_explicit_dispose_fires_disposed_hook() {
        let (_fake, bridge) = bridge();
        let flags = Arc::new(Flags::default());
        let peer =
            PeerObject::create_with_hooks(&bridge, &OBJECT, "()V", &[], flags.clone()).unwrap();

        peer.dispose().unwrap();
        peer.dispose().unwrap();
        drop(peer);

        assert!(flags.disposed.load(Ordering::SeqCst));
        assert!(!flags.finalized.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_fires_finalized_hook() {
        let (fake, bridge) = bridge();
        let flags = Arc::new(Flags::default());
        let peer =
            PeerObject::create_with_hooks(&bridge, &OBJECT, "()V", &[], flags.clone()).unwrap();
        peer.register_with_runtime().unwrap();
        drop(peer);

        assert!(!flags.disposed.load(Ordering::SeqCst));
        assert!(flags.finalized.load(Ordering::SeqCst));
        assert_eq!(bridge.surfaced_count(), 0);
        assert_eq!(fake.live_refs(RefKind::Shared), 1); // only the pinned class
    }

    #[test]
    fn test_panicking_finalizer_is_contained() {
        struct Panics;
        impl PeerHooks for Panics {
            fn finalized(&self) {
                panic!("finalizer failure");
            }
        }

        let (_fake, bridge) = bridge();
        let peer =
            PeerObject::create_with_hooks(&bridge, &OBJECT, "()V", &[], Arc::new(Panics)).unwrap();
        drop(peer);
    }

    #[test]
    fn test_disposed_peer_operations() {
        let (_fake, bridge) = bridge();
        let peer = PeerObject::create(&bridge, &OBJECT, "()V", &[]).unwrap();
        peer.dispose().unwrap();

        // Still readable
        assert_eq!(peer.managed_type(), &OBJECT);
        assert!(peer.members().is_ok());
        assert!(peer.is_disposed());

        assert!(peer.identity().unwrap_err().is_disposed());
        assert!(peer.reference().unwrap_err().is_disposed());
        assert!(peer.same_object(&peer).unwrap_err().is_disposed());
        assert!(peer.register_with_runtime().unwrap_err().is_disposed());
        assert!(peer.invoke("hashCode\0()I", &[]).unwrap_err().is_disposed());
    }
}
