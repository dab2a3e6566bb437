//! Instance member resolution and two-phase object creation

use super::cache::MethodCache;
use super::native_type::NativeType;
use super::{find_peer_type, MemberEnv};
use crate::handle::ReferenceHandle;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use peerbridge_sdk::{
    decode_member, BridgeError, BridgeResult, ManagedType, MethodId, NativeReference, NativeValue,
};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Constructors and instance methods of one declaring managed type.
///
/// Resolved ids are cached per instance and shared by every object of the
/// declaring type. Constructors and methods are cached separately. Managed
/// subtypes get their own lazily created resolver, cached here for the life
/// of the process.
pub struct InstanceMethods {
    env: MemberEnv,
    declaring: &'static ManagedType,
    native_type: Arc<NativeType>,
    constructors: MethodCache,
    methods: MethodCache,
    subtypes: RwLock<FxHashMap<&'static str, Arc<OnceCell<Arc<InstanceMethods>>>>>,
}

impl InstanceMethods {
    pub(crate) fn new(
        env: MemberEnv,
        declaring: &'static ManagedType,
        native_type: Arc<NativeType>,
    ) -> Self {
        Self {
            env,
            declaring,
            native_type,
            constructors: MethodCache::new(),
            methods: MethodCache::new(),
            subtypes: RwLock::new(FxHashMap::default()),
        }
    }

    /// Resolver for a managed type that may only inherit its native peer.
    /// Reuses this resolver's pinned class when the peer is the same.
    fn for_subtype(&self, declaring: &'static ManagedType) -> BridgeResult<Self> {
        let (_, peer_name) =
            find_peer_type(self.env.metadata.as_ref(), declaring).ok_or_else(|| {
                BridgeError::NotSupported(format!(
                    "Cannot create instance of type '{}': no native peer type found.",
                    declaring
                ))
            })?;
        let native_type = if peer_name == self.native_type.name() {
            self.native_type.clone()
        } else {
            Arc::new(NativeType::find(&self.env.runtime, &peer_name)?)
        };
        tracing::debug!(
            managed_type = declaring.name(),
            native_type = %peer_name,
            "created subtype member resolver"
        );
        Ok(Self::new(self.env.clone(), declaring, native_type))
    }

    /// Managed type whose members this resolver caches
    pub fn declaring_type(&self) -> &'static ManagedType {
        self.declaring
    }

    /// Native type the members are resolved against
    pub fn native_type(&self) -> &Arc<NativeType> {
        &self.native_type
    }

    /// Whether creation goes through a single `new_object` call
    pub fn new_object_required(&self) -> bool {
        self.env.new_object_required
    }

    /// Number of resolved constructors and methods
    pub fn resolved_count(&self) -> usize {
        self.constructors.len() + self.methods.len()
    }

    /// Number of cached subtype resolvers
    pub fn subtype_count(&self) -> usize {
        self.subtypes
            .read()
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    /// Resolve a constructor by signature, e.g. `"(I)V"`
    pub fn get_constructor(&self, signature: &str) -> BridgeResult<MethodId> {
        if signature.is_empty() {
            return Err(BridgeError::ArgumentNull("signature"));
        }
        self.constructors
            .get_or_resolve(signature, || self.native_type.get_constructor(signature))
    }

    /// Resolve an instance method from a `name\0signature` token
    pub fn get_method(&self, encoded_member: &str) -> BridgeResult<MethodId> {
        let (name, signature) = decode_member(encoded_member)?;
        self.methods.get_or_resolve(encoded_member, || {
            self.native_type.get_instance_method(name, signature)
        })
    }

    /// Resolver whose constructors belong to `declaring`.
    ///
    /// Returns `self` for this resolver's own declaring type. Any other type
    /// gets a dedicated resolver, created once and reused afterwards.
    pub fn for_declaring_type(
        self: &Arc<Self>,
        declaring: &'static ManagedType,
    ) -> BridgeResult<Arc<InstanceMethods>> {
        if declaring == self.declaring {
            return Ok(self.clone());
        }
        let cell = self.subtype_cell(declaring);
        cell.get_or_try_init(|| self.for_subtype(declaring).map(Arc::new)).cloned()
    }

    /// Per-subtype slot. The map lock is never held while a resolver is
    /// created.
    fn subtype_cell(&self, declaring: &'static ManagedType) -> Arc<OnceCell<Arc<InstanceMethods>>> {
        if let Some(cell) = self.subtypes.read().get(declaring.name()) {
            return cell.clone();
        }
        self.subtypes
            .write()
            .entry(declaring.name())
            .or_default()
            .clone()
    }

    /// First phase of creating an instance of `declaring`.
    ///
    /// Allocates without running a constructor when the runtime allows it,
    /// so a managed peer can exist before the constructor body runs.
    /// Otherwise performs the full construction.
    pub fn start_create_instance(
        self: &Arc<Self>,
        constructor_signature: &str,
        declaring: &'static ManagedType,
        args: &[NativeValue],
    ) -> BridgeResult<ReferenceHandle> {
        if self.env.new_object_required {
            return self.new_object(constructor_signature, declaring, args);
        }
        let methods = self.for_declaring_type(declaring)?;
        methods.native_type.alloc_object()
    }

    fn new_object(
        self: &Arc<Self>,
        constructor_signature: &str,
        declaring: &'static ManagedType,
        args: &[NativeValue],
    ) -> BridgeResult<ReferenceHandle> {
        let methods = self.for_declaring_type(declaring)?;
        let ctor = methods.get_constructor(constructor_signature)?;
        methods.native_type.new_object(ctor, args)
    }

    /// Second phase: run the constructor on the object from
    /// `start_create_instance`. No-op when the first phase already
    /// constructed it.
    pub fn finish_create_instance(
        self: &Arc<Self>,
        constructor_signature: &str,
        declaring: &'static ManagedType,
        target: NativeReference,
        args: &[NativeValue],
    ) -> BridgeResult<()> {
        if self.env.new_object_required {
            return Ok(());
        }
        let methods = self.for_declaring_type(declaring)?;
        let ctor = methods.get_constructor(constructor_signature)?;
        self.env.runtime.call_nonvirtual_constructor(
            target,
            methods.native_type.class_ref()?,
            ctor,
            args,
        )
    }
}

impl fmt::Debug for InstanceMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceMethods")
            .field("declaring", &self.declaring.name())
            .field("native_type", &self.native_type.name())
            .field("resolved", &self.resolved_count())
            .field("subtypes", &self.subtype_count())
            .finish()
    }
}
