//! Native peer types

use crate::handle::ReferenceHandle;
use peerbridge_sdk::{BridgeResult, MethodId, NativeReference, NativeRuntime, NativeValue};
use std::fmt;
use std::sync::Arc;

/// A native type, held through a shared class reference.
///
/// Shared by every resolver whose members are declared on it; it lives as
/// long as the last resolver holding it.
pub struct NativeType {
    name: String,
    class: ReferenceHandle,
}

impl NativeType {
    /// Find `name` in the native VM and pin its class with a shared reference
    pub fn find(runtime: &Arc<dyn NativeRuntime>, name: &str) -> BridgeResult<Self> {
        let local = runtime.find_class(name)?;
        let class = ReferenceHandle::from_owned_checked(runtime.clone(), local)?.into_shared()?;
        tracing::debug!(native_type = name, "registered native type");
        Ok(Self {
            name: name.to_string(),
            class,
        })
    }

    /// Native type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared class reference
    pub fn class_ref(&self) -> BridgeResult<NativeReference> {
        self.class.reference()
    }

    fn runtime(&self) -> &Arc<dyn NativeRuntime> {
        self.class.runtime()
    }

    /// Allocate an instance without running a constructor
    pub fn alloc_object(&self) -> BridgeResult<ReferenceHandle> {
        let local = self.runtime().alloc_object(self.class_ref()?)?;
        ReferenceHandle::from_owned_checked(self.runtime().clone(), local)
    }

    /// Allocate and construct an instance
    pub fn new_object(
        &self,
        ctor: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<ReferenceHandle> {
        let local = self.runtime().new_object(self.class_ref()?, ctor, args)?;
        ReferenceHandle::from_owned_checked(self.runtime().clone(), local)
    }

    /// Resolve a constructor
    pub fn get_constructor(&self, signature: &str) -> BridgeResult<MethodId> {
        self.runtime().get_constructor(self.class_ref()?, signature)
    }

    /// Resolve an instance method
    pub fn get_instance_method(&self, name: &str, signature: &str) -> BridgeResult<MethodId> {
        self.runtime()
            .get_instance_method(self.class_ref()?, name, signature)
    }

    /// Resolve a static method
    pub fn get_static_method(&self, name: &str, signature: &str) -> BridgeResult<MethodId> {
        self.runtime()
            .get_static_method(self.class_ref()?, name, signature)
    }
}

impl fmt::Debug for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeType")
            .field("name", &self.name)
            .field("class", &self.class)
            .finish()
    }
}
