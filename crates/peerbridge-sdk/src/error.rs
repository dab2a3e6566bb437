//! Error types shared by the bridge and runtime implementations

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error kinds
///
/// None of these are retried by the bridge. They surface synchronously to
/// the immediate caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// No native peer type, no marshaling strategy, or a duplicate
    /// registration for an already owned native identity
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Operation not valid in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Operation attempted after the object reached a terminal state
    #[error("Cannot access a disposed object: {0}")]
    Disposed(String),

    /// Exception raised inside the native VM during a call
    #[error("Native exception {class}: {message}")]
    NativeException {
        /// Native exception type name
        class: String,
        /// Exception message
        message: String,
    },

    /// Required argument was empty or null
    #[error("Argument cannot be null: {0}")]
    ArgumentNull(&'static str),

    /// Argument was malformed or of the wrong kind
    #[error("Invalid argument: {0}")]
    ArgumentInvalid(String),
}

impl BridgeError {
    /// Build a `NativeException` from a native class name and message
    pub fn native(class: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::NativeException {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Build a `Disposed` error naming the disposed object
    pub fn disposed(what: impl Into<String>) -> Self {
        BridgeError::Disposed(what.into())
    }

    /// True for `NotSupported`
    pub fn is_not_supported(&self) -> bool {
        matches!(self, BridgeError::NotSupported(_))
    }

    /// True for `Disposed`
    pub fn is_disposed(&self) -> bool {
        matches!(self, BridgeError::Disposed(_))
    }
}
