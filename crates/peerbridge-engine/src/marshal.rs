//! Argument marshaling
//!
//! Each managed argument type maps to exactly one `MarshalStrategy`,
//! registered in a `MarshalRegistry` keyed by `TypeId`:
//! - `DirectValue`: converted straight to a native primitive
//! - `CollectionWrapper`: a native collection is built for the call and its
//!   contents copied back into the managed value afterwards
//! - `ReferenceWrapper`: a temporary native reference is created for the call
//!
//! An `ArgumentMarshalUnit` packages one argument and owns whatever
//! temporary native object the strategy allocated.

use crate::bridge::PeerBridge;
use crate::handle::ReferenceHandle;
use crate::peer::PeerObject;
use parking_lot::RwLock;
use peerbridge_sdk::{BridgeError, BridgeResult, NativeValue};
use rustc_hash::FxHashMap;
use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

/// Converts a value directly to a native primitive
pub type DirectFn<T> = Arc<dyn Fn(&T) -> NativeValue + Send + Sync>;

/// Creates a temporary native object for a value
pub type CreateFn<T> = Arc<dyn Fn(&PeerBridge, &T) -> BridgeResult<ReferenceHandle> + Send + Sync>;

/// Copies a native collection's contents back into the managed value
pub type CopyBackFn<T> =
    Arc<dyn Fn(&PeerBridge, &ReferenceHandle, &mut T) -> BridgeResult<()> + Send + Sync>;

/// How one managed type is passed to native code
pub enum MarshalStrategy<T> {
    /// Direct value-to-primitive conversion
    DirectValue(DirectFn<T>),
    /// Native collection built for the call, copied back afterwards
    CollectionWrapper {
        /// Builds the native collection
        create: CreateFn<T>,
        /// Copies results back into the managed value
        copy_back: CopyBackFn<T>,
    },
    /// Temporary native object reference
    ReferenceWrapper(CreateFn<T>),
}

/// Strategy kind without the conversion functions
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MarshalKind {
    /// See `MarshalStrategy::DirectValue`
    DirectValue,
    /// See `MarshalStrategy::CollectionWrapper`
    CollectionWrapper,
    /// See `MarshalStrategy::ReferenceWrapper`
    ReferenceWrapper,
}

impl<T> MarshalStrategy<T> {
    /// Direct conversion strategy
    pub fn direct(convert: impl Fn(&T) -> NativeValue + Send + Sync + 'static) -> Self {
        MarshalStrategy::DirectValue(Arc::new(convert))
    }

    /// Collection strategy
    pub fn collection(
        create: impl Fn(&PeerBridge, &T) -> BridgeResult<ReferenceHandle> + Send + Sync + 'static,
        copy_back: impl Fn(&PeerBridge, &ReferenceHandle, &mut T) -> BridgeResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        MarshalStrategy::CollectionWrapper {
            create: Arc::new(create),
            copy_back: Arc::new(copy_back),
        }
    }

    /// Reference strategy
    pub fn reference(
        create: impl Fn(&PeerBridge, &T) -> BridgeResult<ReferenceHandle> + Send + Sync + 'static,
    ) -> Self {
        MarshalStrategy::ReferenceWrapper(Arc::new(create))
    }

    /// Strategy kind
    pub fn kind(&self) -> MarshalKind {
        match self {
            MarshalStrategy::DirectValue(_) => MarshalKind::DirectValue,
            MarshalStrategy::CollectionWrapper { .. } => MarshalKind::CollectionWrapper,
            MarshalStrategy::ReferenceWrapper(_) => MarshalKind::ReferenceWrapper,
        }
    }
}

impl<T> Clone for MarshalStrategy<T> {
    fn clone(&self) -> Self {
        match self {
            MarshalStrategy::DirectValue(f) => MarshalStrategy::DirectValue(f.clone()),
            MarshalStrategy::CollectionWrapper { create, copy_back } => {
                MarshalStrategy::CollectionWrapper {
                    create: create.clone(),
                    copy_back: copy_back.clone(),
                }
            }
            MarshalStrategy::ReferenceWrapper(f) => MarshalStrategy::ReferenceWrapper(f.clone()),
        }
    }
}

/// Capability table of marshal strategies by managed type
#[derive(Default)]
pub struct MarshalRegistry {
    strategies: RwLock<FxHashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl MarshalRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with primitives, peers and reference handles
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(MarshalStrategy::<bool>::direct(|v| NativeValue::Bool(*v)));
        registry.register(MarshalStrategy::<i8>::direct(|v| NativeValue::Byte(*v)));
        registry.register(MarshalStrategy::<u16>::direct(|v| NativeValue::Char(*v)));
        registry.register(MarshalStrategy::<i16>::direct(|v| NativeValue::Short(*v)));
        registry.register(MarshalStrategy::<i32>::direct(|v| NativeValue::Int(*v)));
        registry.register(MarshalStrategy::<i64>::direct(|v| NativeValue::Long(*v)));
        registry.register(MarshalStrategy::<f32>::direct(|v| NativeValue::Float(*v)));
        registry.register(MarshalStrategy::<f64>::direct(|v| NativeValue::Double(*v)));
        registry.register(MarshalStrategy::<Arc<PeerObject>>::reference(
            |_: &PeerBridge, peer: &Arc<PeerObject>| peer.new_local_ref(),
        ));
        registry.register(MarshalStrategy::<ReferenceHandle>::reference(
            |_: &PeerBridge, handle: &ReferenceHandle| handle.new_local_ref(),
        ));
        registry
    }

    /// Set the strategy for `T`, replacing any previous one
    pub fn register<T: 'static>(&self, strategy: MarshalStrategy<T>) {
        self.strategies
            .write()
            .insert(TypeId::of::<T>(), Arc::new(strategy));
    }

    /// Strategy for `T`
    pub fn strategy<T: 'static>(&self) -> Option<MarshalStrategy<T>> {
        self.strategies
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<MarshalStrategy<T>>())
            .cloned()
    }

    /// Strategy kind for `T`
    pub fn kind_of<T: 'static>(&self) -> Option<MarshalKind> {
        self.strategy::<T>().map(|s| s.kind())
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.strategies.read().len()
    }

    /// Check if no strategies are registered
    pub fn is_empty(&self) -> bool {
        self.strategies.read().is_empty()
    }
}

/// One packaged call argument
pub struct ArgumentMarshalUnit<T: 'static> {
    bridge: PeerBridge,
    value: NativeValue,
    kind: MarshalKind,
    temporary: Option<ReferenceHandle>,
    copy_back: Option<CopyBackFn<T>>,
}

impl<T: 'static> ArgumentMarshalUnit<T> {
    /// Package `value` using the bridge's strategy for `T`
    pub fn new(bridge: &PeerBridge, value: &T) -> BridgeResult<Self> {
        let strategy = bridge.marshal_registry().strategy::<T>().ok_or_else(|| {
            BridgeError::NotSupported(format!(
                "No marshaling strategy for type {}",
                type_name::<T>()
            ))
        })?;

        let kind = strategy.kind();
        let (native, temporary, copy_back) = match strategy {
            MarshalStrategy::DirectValue(convert) => (convert(value), None, None),
            MarshalStrategy::CollectionWrapper { create, copy_back } => {
                let collection = create(bridge, value)?;
                (collection.as_value()?, Some(collection), Some(copy_back))
            }
            MarshalStrategy::ReferenceWrapper(create) => {
                let reference = create(bridge, value)?;
                (reference.as_value()?, Some(reference), None)
            }
        };

        Ok(Self {
            bridge: bridge.clone(),
            value: native,
            kind,
            temporary,
            copy_back,
        })
    }

    /// Native argument value
    pub fn value(&self) -> NativeValue {
        self.value
    }

    /// Strategy used for this argument
    pub fn kind(&self) -> MarshalKind {
        self.kind
    }

    /// Finish the call: copy collection results back into `original` and
    /// release any temporary native object. Failures are logged.
    pub fn cleanup(mut self, original: &mut T) {
        if let (Some(copy_back), Some(temporary)) = (self.copy_back.take(), &self.temporary) {
            if let Err(err) = copy_back(&self.bridge, temporary, original) {
                tracing::warn!(
                    argument_type = type_name::<T>(),
                    error = %err,
                    "failed to copy marshaled collection back"
                );
            }
        }
        if let Some(mut temporary) = self.temporary.take() {
            temporary.dispose();
        }
    }
}

impl<T: 'static> std::fmt::Debug for ArgumentMarshalUnit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgumentMarshalUnit")
            .field("type", &type_name::<T>())
            .field("kind", &self.kind)
            .field("value", &self.value)
            .finish()
    }
}
