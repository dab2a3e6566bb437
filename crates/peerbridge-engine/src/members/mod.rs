//! Per-type member resolution
//!
//! This module provides:
//! - `NativeType`: a native class pinned by a shared reference
//! - `MethodCache`: memoized, concurrency-safe id resolution
//! - `InstanceMethods`: constructors, instance methods and subtype resolvers
//! - `StaticMethods`: static methods
//! - `PeerMembers`: both resolvers for one declaring managed type

mod cache;
mod instance;
mod native_type;
mod statics;

pub use cache::MethodCache;
pub use instance::InstanceMethods;
pub use native_type::NativeType;
pub use statics::StaticMethods;

use peerbridge_sdk::{BridgeError, BridgeResult, ManagedType, NativeRuntime, TypeMetadataProvider};
use std::sync::Arc;

/// Collaborators every resolver needs
#[derive(Clone)]
pub(crate) struct MemberEnv {
    pub(crate) runtime: Arc<dyn NativeRuntime>,
    pub(crate) metadata: Arc<dyn TypeMetadataProvider>,
    pub(crate) new_object_required: bool,
}

/// Nearest type in `ty`'s ancestry (itself first) that declares a native
/// peer, with the peer's name
pub(crate) fn find_peer_type(
    metadata: &dyn TypeMetadataProvider,
    ty: &'static ManagedType,
) -> Option<(&'static ManagedType, String)> {
    ty.ancestors()
        .find_map(|candidate| metadata.native_peer_name(candidate).map(|name| (candidate, name)))
}

/// Instance and static members declared by one managed type
pub struct PeerMembers {
    declaring: &'static ManagedType,
    native_type: Arc<NativeType>,
    instance: Arc<InstanceMethods>,
    statics: StaticMethods,
}

impl PeerMembers {
    pub(crate) fn new(env: MemberEnv, declaring: &'static ManagedType) -> BridgeResult<Self> {
        let peer_name = env.metadata.native_peer_name(declaring).ok_or_else(|| {
            BridgeError::NotSupported(format!(
                "Type '{}' does not declare a native peer type",
                declaring
            ))
        })?;
        let native_type = Arc::new(NativeType::find(&env.runtime, &peer_name)?);
        Ok(Self {
            declaring,
            instance: Arc::new(InstanceMethods::new(
                env.clone(),
                declaring,
                native_type.clone(),
            )),
            statics: StaticMethods::new(env, native_type.clone()),
            native_type,
        })
    }

    /// Managed type declaring these members
    pub fn declaring_type(&self) -> &'static ManagedType {
        self.declaring
    }

    /// Native peer type
    pub fn native_type(&self) -> &Arc<NativeType> {
        &self.native_type
    }

    /// Constructors and instance methods
    pub fn instance(&self) -> &Arc<InstanceMethods> {
        &self.instance
    }

    /// Static methods
    pub fn statics(&self) -> &StaticMethods {
        &self.statics
    }
}

impl std::fmt::Debug for PeerMembers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerMembers")
            .field("declaring", &self.declaring.name())
            .field("native_type", &self.native_type.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeMap;
    use peerbridge_sdk::{NativeValue, RefKind};
    use peerbridge_test::FakeRuntime;

    static OBJECT: ManagedType = ManagedType::root("Test.Object");
    static DERIVED: ManagedType = ManagedType::derived("Test.Derived", &OBJECT);
    static ORPHAN: ManagedType = ManagedType::root("Test.Orphan");

    fn env(fake: &Arc<FakeRuntime>) -> MemberEnv {
        let metadata = TypeMap::new().with(&OBJECT, "java/lang/Object");
        MemberEnv {
            runtime: fake.clone(),
            metadata: Arc::new(metadata),
            new_object_required: fake.new_object_required(),
        }
    }

    #[test]
    fn test_find_peer_type_walks_ancestors() {
        let metadata = TypeMap::new().with(&OBJECT, "java/lang/Object");
        let (binding, name) = find_peer_type(&metadata, &DERIVED).unwrap();
        assert_eq!(binding, &OBJECT);
        assert_eq!(name, "java/lang/Object");
        assert!(find_peer_type(&metadata, &ORPHAN).is_none());
    }

    #[test]
    fn test_members_pin_native_type() {
        let fake = Arc::new(FakeRuntime::new());
        let members = PeerMembers::new(env(&fake), &OBJECT).unwrap();

        assert_eq!(members.native_type().name(), "java/lang/Object");
        assert_eq!(members.declaring_type(), &OBJECT);
        // find_class local released after promotion
        assert_eq!(fake.live_refs(RefKind::Local), 0);
        assert_eq!(fake.live_refs(RefKind::Shared), 1);
    }

    #[test]
    fn test_members_require_declared_peer() {
        let fake = Arc::new(FakeRuntime::new());
        let err = PeerMembers::new(env(&fake), &DERIVED).unwrap_err();
        assert!(err.is_not_supported());
    }

    #[test]
    fn test_constructor_cached() {
        let fake = Arc::new(FakeRuntime::new());
        let members = PeerMembers::new(env(&fake), &OBJECT).unwrap();

        let a = members.instance().get_constructor("()V").unwrap();
        let b = members.instance().get_constructor("()V").unwrap();
        assert_eq!(a, b);
        assert_eq!(fake.stats().get_constructor, 1);

        let err = members.instance().get_constructor("").unwrap_err();
        assert_eq!(err, BridgeError::ArgumentNull("signature"));
    }

    #[test]
    fn test_constructors_and_methods_keyed_apart() {
        let fake = Arc::new(FakeRuntime::new());
        let members = PeerMembers::new(env(&fake), &OBJECT).unwrap();
        let instance = members.instance();

        instance.get_constructor("()V").unwrap();
        let err = instance.get_method("()V").unwrap_err();
        assert!(matches!(err, BridgeError::ArgumentInvalid(_)));

        instance.get_method("hashCode\0()I").unwrap();
        let err = instance.get_constructor("hashCode\0()I").unwrap_err();
        assert!(matches!(err, BridgeError::NativeException { .. }));

        assert_eq!(instance.resolved_count(), 2);
        assert_eq!(fake.stats().get_constructor, 2);
        assert_eq!(fake.stats().get_instance_method, 1);
    }

    #[test]
    fn test_static_call() {
        let fake = Arc::new(FakeRuntime::new());
        fake.define_class("java/lang/Object")
            .static_method("identity", "(I)I")
            .define();
        let members = PeerMembers::new(env(&fake), &OBJECT).unwrap();

        let result = members
            .statics()
            .call("identity\0(I)I", &[NativeValue::Int(41)])
            .unwrap();
        assert_eq!(result, NativeValue::Int(41));
        assert_eq!(members.statics().resolved_count(), 1);
    }
}
