//! peerbridge engine - object lifetime bridge between a managed and a native VM
//!
//! This crate keeps managed peers and native objects paired one-to-one:
//! - `HandleTable`: registry of live peers by native identity
//! - `ReferenceHandle`: owner of one native reference slot
//! - `PeerObject`: registration and disposal state machine of one peer
//! - `PeerMembers`: per-type constructor and method resolution caches
//! - `ArgumentMarshalUnit`: per-argument conversion for native calls
//!
//! Everything hangs off a `PeerBridge`, which is handed a `NativeRuntime`
//! and a `TypeMetadataProvider` at construction.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod handle;
pub mod marshal;
pub mod members;
pub mod options;
pub mod peer;
pub mod table;
pub mod types;

pub use bridge::PeerBridge;
pub use handle::ReferenceHandle;
pub use marshal::{ArgumentMarshalUnit, MarshalKind, MarshalRegistry, MarshalStrategy};
pub use members::{InstanceMethods, MethodCache, NativeType, PeerMembers, StaticMethods};
pub use options::BridgeOptions;
pub use peer::{Ownership, PeerHooks, PeerObject, PeerStatus};
pub use table::HandleTable;
pub use types::TypeMap;

pub use peerbridge_sdk::{
    decode_member, encode_member, BridgeError, BridgeResult, ManagedType, MethodId,
    NativeIdentity, NativeReference, NativeRuntime, NativeValue, RawRef, RefKind,
    TypeMetadataProvider,
};
