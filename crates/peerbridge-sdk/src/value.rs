//! Native calling-convention values

use crate::reference::RawRef;

/// A single argument or return value in the native calling convention
///
/// Primitives are stored inline. Objects are passed as raw references; the
/// slot they name stays owned by whoever allocated it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum NativeValue {
    /// No value (void return)
    Void,
    /// Boolean
    Bool(bool),
    /// Signed 8-bit integer
    Byte(i8),
    /// UTF-16 code unit
    Char(u16),
    /// Signed 16-bit integer
    Short(i16),
    /// Signed 32-bit integer
    Int(i32),
    /// Signed 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Object reference (may be null)
    Object(RawRef),
}

impl NativeValue {
    /// Null object reference
    pub fn null() -> Self {
        NativeValue::Object(RawRef::NULL)
    }

    /// Signature type code for this value
    pub fn type_code(&self) -> char {
        match self {
            NativeValue::Void => 'V',
            NativeValue::Bool(_) => 'Z',
            NativeValue::Byte(_) => 'B',
            NativeValue::Char(_) => 'C',
            NativeValue::Short(_) => 'S',
            NativeValue::Int(_) => 'I',
            NativeValue::Long(_) => 'J',
            NativeValue::Float(_) => 'F',
            NativeValue::Double(_) => 'D',
            NativeValue::Object(_) => 'L',
        }
    }

    /// Get as i32 if this is an `Int`
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            NativeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the raw reference if this is an `Object`
    pub fn as_object(&self) -> Option<RawRef> {
        match self {
            NativeValue::Object(r) => Some(*r),
            _ => None,
        }
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        NativeValue::Bool(b)
    }
}

impl From<i32> for NativeValue {
    fn from(i: i32) -> Self {
        NativeValue::Int(i)
    }
}

impl From<i64> for NativeValue {
    fn from(i: i64) -> Self {
        NativeValue::Long(i)
    }
}

impl From<f64> for NativeValue {
    fn from(f: f64) -> Self {
        NativeValue::Double(f)
    }
}
