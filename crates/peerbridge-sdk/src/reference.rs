//! Native reference types
//!
//! These are plain values. Ownership of a native reference slot is tracked
//! by the engine's `ReferenceHandle`, never by the types in this module.

use std::fmt;

/// Raw native reference slot value
///
/// The value identifies a slot, not an object. Two slots referring to the
/// same object have different raw values, and the native collector may
/// move the object behind a slot at any time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawRef(u64);

impl RawRef {
    /// The null reference
    pub const NULL: RawRef = RawRef(0);

    /// Create a raw reference from a slot value
    pub fn from_u64(raw: u64) -> Self {
        RawRef(raw)
    }

    /// Get the slot value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Check for the null reference
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RawRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Strength class of a native reference
///
/// `Local < Shared`; promotion is the only forward edge and always
/// allocates a new slot. A slot's class never changes once allocated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// Valid only within the creating thread's current native call scope
    Local,
    /// Global reference, valid process-wide until released
    Shared,
    /// Weak global reference; does not keep the native object alive
    Weak,
}

impl RefKind {
    /// Name used in log output and error messages
    pub fn name(self) -> &'static str {
        match self {
            RefKind::Local => "local",
            RefKind::Shared => "shared",
            RefKind::Weak => "weak",
        }
    }
}

/// A raw native reference tagged with its strength class
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NativeReference {
    raw: RawRef,
    kind: RefKind,
}

impl NativeReference {
    /// Create a tagged reference
    pub fn new(raw: RawRef, kind: RefKind) -> Self {
        Self { raw, kind }
    }

    /// Null local reference
    pub fn null() -> Self {
        Self::new(RawRef::NULL, RefKind::Local)
    }

    /// Raw slot value
    pub fn raw(&self) -> RawRef {
        self.raw
    }

    /// Strength class
    pub fn kind(&self) -> RefKind {
        self.kind
    }

    /// Check for a null slot
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }
}

impl fmt::Display for NativeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.raw, self.kind.name())
    }
}

/// Stable identity of a native object
///
/// Computed by the native runtime from the object itself, so every
/// reference to the same live object yields the same identity no matter
/// which slot or strength class is used to ask.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeIdentity(u64);

impl NativeIdentity {
    /// Create an identity from its numeric value
    pub fn from_u64(id: u64) -> Self {
        NativeIdentity(id)
    }

    /// Get the numeric identity value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NativeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Resolved native method or constructor identifier
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MethodId(u64);

impl MethodId {
    /// Create a method id from the runtime's raw value
    pub fn from_u64(id: u64) -> Self {
        MethodId(id)
    }

    /// Get the raw value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}
