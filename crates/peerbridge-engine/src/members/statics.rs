//! Static member resolution

use super::cache::MethodCache;
use super::native_type::NativeType;
use super::MemberEnv;
use peerbridge_sdk::{decode_member, BridgeResult, MethodId, NativeValue};
use std::sync::Arc;

/// Static methods of one native type
pub struct StaticMethods {
    env: MemberEnv,
    native_type: Arc<NativeType>,
    methods: MethodCache,
}

impl StaticMethods {
    pub(crate) fn new(env: MemberEnv, native_type: Arc<NativeType>) -> Self {
        Self {
            env,
            native_type,
            methods: MethodCache::new(),
        }
    }

    /// Resolve a static method from a `name\0signature` token
    pub fn get_method(&self, encoded_member: &str) -> BridgeResult<MethodId> {
        let (name, signature) = decode_member(encoded_member)?;
        self.methods.get_or_resolve(encoded_member, || {
            self.native_type.get_static_method(name, signature)
        })
    }

    /// Resolve and invoke a static method
    pub fn call(&self, encoded_member: &str, args: &[NativeValue]) -> BridgeResult<NativeValue> {
        let method = self.get_method(encoded_member)?;
        self.env
            .runtime
            .call_static_method(self.native_type.class_ref()?, method, args)
    }

    /// Number of resolved static methods
    pub fn resolved_count(&self) -> usize {
        self.methods.len()
    }
}
