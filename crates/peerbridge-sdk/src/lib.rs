//! peerbridge SDK - contracts between the peer bridge and a native VM
//!
//! This crate provides the minimal types and traits needed to plug a native
//! runtime into the bridge without depending on `peerbridge-engine`:
//! - Reference, identity and method id values
//! - `NativeValue` calling-convention values
//! - The `NativeRuntime` capability trait
//! - `ManagedType` descriptors and the `TypeMetadataProvider` trait
//! - `BridgeError`, the shared error type

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod metadata;
pub mod reference;
pub mod runtime;
pub mod value;

pub use error::{BridgeError, BridgeResult};
pub use metadata::{
    decode_member, encode_member, ManagedType, TypeMetadataProvider, MEMBER_SEPARATOR,
};
pub use reference::{MethodId, NativeIdentity, NativeReference, RawRef, RefKind};
pub use runtime::NativeRuntime;
pub use value::NativeValue;
