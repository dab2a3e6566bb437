//! Owned native reference slots
//!
//! A `ReferenceHandle` owns exactly one native reference slot and releases
//! it when disposed or dropped. Handles are never cloned: copying a
//! reference always goes through the runtime and yields a new slot with
//! its own handle.

use peerbridge_sdk::{
    BridgeError, BridgeResult, NativeIdentity, NativeReference, NativeRuntime, NativeValue, RawRef,
    RefKind,
};
use std::fmt;
use std::sync::Arc;

/// Exclusive owner of one native reference slot.
///
/// State machine: `Valid(kind) -> Disposed`. Disposal is irreversible.
/// After disposal every accessor fails with `BridgeError::Disposed`
/// except `dispose` itself and `is_disposed`.
pub struct ReferenceHandle {
    runtime: Arc<dyn NativeRuntime>,
    slot: Option<NativeReference>,
}

impl ReferenceHandle {
    /// Take ownership of `reference`.
    ///
    /// The caller must own the slot; it is released when this handle is
    /// disposed.
    pub fn from_owned(runtime: Arc<dyn NativeRuntime>, reference: NativeReference) -> Self {
        Self {
            runtime,
            slot: Some(reference),
        }
    }

    /// Take ownership of `reference`, rejecting a null slot
    pub fn from_owned_checked(
        runtime: Arc<dyn NativeRuntime>,
        reference: NativeReference,
    ) -> BridgeResult<Self> {
        if reference.is_null() {
            return Err(BridgeError::ArgumentInvalid(
                "Cannot wrap a null native reference".to_string(),
            ));
        }
        Ok(Self::from_owned(runtime, reference))
    }

    /// A handle that owns nothing and reports itself disposed
    pub fn invalid(runtime: Arc<dyn NativeRuntime>) -> Self {
        Self {
            runtime,
            slot: None,
        }
    }

    /// The runtime this handle releases through
    pub fn runtime(&self) -> &Arc<dyn NativeRuntime> {
        &self.runtime
    }

    /// Check whether the slot was released or moved out
    pub fn is_disposed(&self) -> bool {
        self.slot.is_none()
    }

    /// The owned reference
    pub fn reference(&self) -> BridgeResult<NativeReference> {
        self.slot.ok_or_else(|| BridgeError::disposed("ReferenceHandle"))
    }

    /// Raw slot value
    pub fn raw(&self) -> BridgeResult<RawRef> {
        self.reference().map(|r| r.raw())
    }

    /// Strength class of the owned slot
    pub fn kind(&self) -> BridgeResult<RefKind> {
        self.reference().map(|r| r.kind())
    }

    /// The reference as a call argument. The slot stays owned by this handle.
    pub fn as_value(&self) -> BridgeResult<NativeValue> {
        self.raw().map(NativeValue::Object)
    }

    /// Native identity of the referenced object
    pub fn identity(&self) -> BridgeResult<NativeIdentity> {
        self.runtime.identity(self.reference()?)
    }

    /// Check whether both handles refer to the same native object
    pub fn same_object(&self, other: &ReferenceHandle) -> BridgeResult<bool> {
        self.runtime.is_same_object(self.reference()?, other.reference()?)
    }

    /// Allocate a new shared (global) slot for the same object
    pub fn new_shared_ref(&self) -> BridgeResult<ReferenceHandle> {
        let shared = self.runtime.new_global_ref(self.reference()?)?;
        self.adopt_copy(shared)
    }

    /// Allocate a new local slot for the same object, for temporary use
    pub fn new_local_ref(&self) -> BridgeResult<ReferenceHandle> {
        let local = self.runtime.new_local_ref(self.reference()?)?;
        self.adopt_copy(local)
    }

    /// Allocate a new weak slot that does not keep the object alive
    pub fn new_weak_ref(&self) -> BridgeResult<ReferenceHandle> {
        let weak = self.runtime.new_weak_ref(self.reference()?)?;
        self.adopt_copy(weak)
    }

    /// Allocate a new slot of the same strength class
    pub fn duplicate(&self) -> BridgeResult<ReferenceHandle> {
        match self.kind()? {
            RefKind::Local => self.new_local_ref(),
            RefKind::Shared => self.new_shared_ref(),
            RefKind::Weak => self.new_weak_ref(),
        }
    }

    /// Get a local handle for a weak slot's object, if it is still alive
    pub fn upgrade(&self) -> BridgeResult<Option<ReferenceHandle>> {
        let local = self.runtime.new_local_ref(self.reference()?)?;
        if local.is_null() {
            return Ok(None);
        }
        Ok(Some(Self::from_owned(self.runtime.clone(), local)))
    }

    /// Promote to a shared reference.
    ///
    /// A shared handle is returned unchanged. Otherwise a new shared slot is
    /// allocated and this handle is disposed. If allocation fails this handle
    /// is released as well.
    pub fn into_shared(mut self) -> BridgeResult<ReferenceHandle> {
        if self.kind()? == RefKind::Shared {
            return Ok(self);
        }
        let shared = self.new_shared_ref();
        self.dispose();
        shared
    }

    /// Move the slot into a new handle, leaving this one disposed without
    /// releasing anything
    pub fn take(&mut self) -> BridgeResult<ReferenceHandle> {
        let slot = self
            .slot
            .take()
            .ok_or_else(|| BridgeError::disposed("ReferenceHandle"))?;
        Ok(Self::from_owned(self.runtime.clone(), slot))
    }

    /// Give up ownership of the slot without releasing it
    pub fn into_raw(mut self) -> BridgeResult<NativeReference> {
        self.slot
            .take()
            .ok_or_else(|| BridgeError::disposed("ReferenceHandle"))
    }

    /// Release the slot. Calling this again is a no-op.
    pub fn dispose(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(error = %err, "failed to release native reference");
        }
    }

    /// Release the slot, reporting a runtime failure to the caller.
    ///
    /// The handle is disposed even when the runtime reports an error.
    pub fn release(&mut self) -> BridgeResult<()> {
        match self.slot.take() {
            Some(reference) => {
                tracing::trace!(reference = %reference, "releasing native reference");
                self.runtime.delete_ref(reference)
            }
            None => Ok(()),
        }
    }

    /// Own a slot copied from this handle. The runtime hands back a null
    /// slot when a weak source's object is gone.
    fn adopt_copy(&self, copy: NativeReference) -> BridgeResult<ReferenceHandle> {
        if copy.is_null() {
            return Err(BridgeError::InvalidOperation(
                "Referenced native object has been collected".to_string(),
            ));
        }
        Ok(Self::from_owned(self.runtime.clone(), copy))
    }
}

impl Drop for ReferenceHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for ReferenceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.slot {
            Some(reference) => f
                .debug_struct("ReferenceHandle")
                .field("raw", &reference.raw())
                .field("kind", &reference.kind())
                .finish(),
            None => f.write_str("ReferenceHandle(disposed)"),
        }
    }
}
