//! NativeRuntime trait - the native VM invocation layer
//!
//! The bridge programs against this trait only. A JNI-backed implementation,
//! an embedded VM, or the in-memory fake used by tests all plug in here.
//!
//! Every method may be called concurrently from any thread, including
//! threads created by the native VM itself.

use crate::error::BridgeResult;
use crate::reference::{MethodId, NativeIdentity, NativeReference};
use crate::value::NativeValue;

/// Abstract native VM operations used by the bridge.
///
/// References returned by the allocation methods are new slots owned by the
/// caller, who must eventually pass them to `delete_ref`. Exceptions thrown
/// inside the native VM are reported as `BridgeError::NativeException`.
pub trait NativeRuntime: Send + Sync {
    // ========================================================================
    // Capabilities
    // ========================================================================

    /// True when the runtime cannot allocate an object without running a
    /// constructor, so creation must go through `new_object` in one step.
    fn new_object_required(&self) -> bool;

    // ========================================================================
    // Types and Members
    // ========================================================================

    /// Look up a native type by name, returning a local class reference
    fn find_class(&self, name: &str) -> BridgeResult<NativeReference>;

    /// Resolve a constructor on `class`
    fn get_constructor(&self, class: NativeReference, signature: &str) -> BridgeResult<MethodId>;

    /// Resolve an instance method on `class`
    fn get_instance_method(
        &self,
        class: NativeReference,
        name: &str,
        signature: &str,
    ) -> BridgeResult<MethodId>;

    /// Resolve a static method on `class`
    fn get_static_method(
        &self,
        class: NativeReference,
        name: &str,
        signature: &str,
    ) -> BridgeResult<MethodId>;

    // ========================================================================
    // Object Creation
    // ========================================================================

    /// Allocate an instance of `class` without running any constructor
    fn alloc_object(&self, class: NativeReference) -> BridgeResult<NativeReference>;

    /// Allocate and construct an instance of `class`
    fn new_object(
        &self,
        class: NativeReference,
        ctor: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<NativeReference>;

    /// Run `ctor`, as declared on `class`, on an already allocated `target`
    fn call_nonvirtual_constructor(
        &self,
        target: NativeReference,
        class: NativeReference,
        ctor: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<()>;

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Invoke an instance method with virtual dispatch
    fn call_method(
        &self,
        target: NativeReference,
        method: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<NativeValue>;

    /// Invoke a static method declared on `class`
    fn call_static_method(
        &self,
        class: NativeReference,
        method: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<NativeValue>;

    // ========================================================================
    // Reference Management
    // ========================================================================

    /// Create a new shared (global) reference to the object behind `r`
    fn new_global_ref(&self, r: NativeReference) -> BridgeResult<NativeReference>;

    /// Create a new local reference to the object behind `r`
    ///
    /// Returns a null reference if `r` is weak and its object was collected.
    fn new_local_ref(&self, r: NativeReference) -> BridgeResult<NativeReference>;

    /// Create a new weak reference to the object behind `r`
    fn new_weak_ref(&self, r: NativeReference) -> BridgeResult<NativeReference>;

    /// Release a reference slot of any strength class
    fn delete_ref(&self, r: NativeReference) -> BridgeResult<()>;

    /// Compare the objects behind two references
    fn is_same_object(&self, a: NativeReference, b: NativeReference) -> BridgeResult<bool>;

    /// Stable identity of the object behind `r`
    fn identity(&self, r: NativeReference) -> BridgeResult<NativeIdentity>;
}
