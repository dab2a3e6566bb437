//! Managed type descriptors and native type metadata

use crate::error::{BridgeError, BridgeResult};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Managed-side type descriptor
///
/// Descriptors are normally `static` items so ancestry can be expressed by
/// reference:
///
/// ```ignore
/// static BASE: ManagedType = ManagedType::root("App.Widget");
/// static BUTTON: ManagedType = ManagedType::derived("App.Button", &BASE);
/// ```
///
/// Equality and hashing use the full name only.
pub struct ManagedType {
    name: &'static str,
    base: Option<&'static ManagedType>,
}

impl ManagedType {
    /// Type without a managed base
    pub const fn root(name: &'static str) -> Self {
        Self { name, base: None }
    }

    /// Type deriving from `base`
    pub const fn derived(name: &'static str, base: &'static ManagedType) -> Self {
        Self {
            name,
            base: Some(base),
        }
    }

    /// Full type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Direct base type
    pub fn base(&self) -> Option<&'static ManagedType> {
        self.base
    }

    /// Iterate over this type and then each base type, nearest first
    pub fn ancestors(&self) -> impl Iterator<Item = &ManagedType> {
        std::iter::successors(Some(self), |ty| ty.base.map(|b| b as &ManagedType))
    }

    /// Check whether `self` is `other` or derives from it
    pub fn is_subtype_of(&self, other: &ManagedType) -> bool {
        self.ancestors().any(|ty| ty == other)
    }
}

impl PartialEq for ManagedType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ManagedType {}

impl Hash for ManagedType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for ManagedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedType")
            .field("name", &self.name)
            .field("base", &self.base.map(|b| b.name))
            .finish()
    }
}

impl fmt::Display for ManagedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Maps managed types to native peer type names.
///
/// Returns `None` when `ty` itself declares no native peer. Inherited
/// declarations are resolved by the bridge by walking `ty.ancestors()`.
pub trait TypeMetadataProvider: Send + Sync {
    /// Native peer type name declared by `ty`
    fn native_peer_name(&self, ty: &ManagedType) -> Option<String>;
}

/// Separator between member name and signature in an encoded member token
pub const MEMBER_SEPARATOR: char = '\0';

/// Encode a member name and signature as `name\0signature`
pub fn encode_member(name: &str, signature: &str) -> String {
    let mut encoded = String::with_capacity(name.len() + signature.len() + 1);
    encoded.push_str(name);
    encoded.push(MEMBER_SEPARATOR);
    encoded.push_str(signature);
    encoded
}

/// Split an encoded `name\0signature` token
pub fn decode_member(encoded: &str) -> BridgeResult<(&str, &str)> {
    if encoded.is_empty() {
        return Err(BridgeError::ArgumentNull("encoded_member"));
    }
    match encoded.split_once(MEMBER_SEPARATOR) {
        Some((name, signature)) if !name.is_empty() && !signature.is_empty() => {
            Ok((name, signature))
        }
        _ => Err(BridgeError::ArgumentInvalid(format!(
            "Invalid encoded member '{}': expected 'name\\0signature'",
            encoded.escape_debug()
        ))),
    }
}
