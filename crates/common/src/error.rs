//! Central error types for the control plane (thiserror-based).

use thiserror::Error;

use crate::property::PropertyKind;
use crate::types::Resolution;

/// Top-level codec session error.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    #[error("Motion estimator error: {0}")]
    Estimator(#[from] EstimatorError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Codec session is not open")]
    NotOpen,

    #[error("Codec session is already open")]
    AlreadyOpen,

    /// A control-plane call was issued while an encode/decode call was in flight.
    #[error("Invalid state: {operation} called while an encode/decode call is in flight")]
    InvalidState { operation: String },

    /// The owning session has been dropped; the handle is dangling.
    #[error("Codec session has been destroyed")]
    SessionClosed,

    #[error("Frame geometry mismatch: expected {expected}, got {got}")]
    FrameGeometry {
        expected: Resolution,
        got: Resolution,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Code failed at frame {frame}: {reason}")]
    CodeFailed { frame: u64, reason: String },

    #[error("Decode failed: {0}")]
    DecodeFailed(String),
}

impl CodecError {
    pub fn invalid_state(operation: impl Into<String>) -> Self {
        Self::InvalidState {
            operation: operation.into(),
        }
    }

    /// Whether this error reports an unknown property name or ordinal.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Property(PropertyError::NotFound { .. } | PropertyError::OutOfRange { .. })
        )
    }
}

/// Named-property protocol errors. None of these modify registry state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("No member named '{name}'")]
    NotFound { name: String },

    #[error("Member ordinal {ordinal} out of range (count {count})")]
    OutOfRange { ordinal: usize, count: usize },

    #[error("Member '{name}' length mismatch: expected {expected} elements, got {got}")]
    LengthMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Member '{name}' type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: PropertyKind,
        got: PropertyKind,
    },

    /// Shape matched but the content is outside the slot's accepted range.
    #[error("Member '{name}' rejected value: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Member '{name}' is read-only")]
    ReadOnly { name: String },

    #[error("Member name '{name}' is reserved")]
    Reserved { name: String },

    #[error("Member already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Registry is sealed; cannot register '{name}'")]
    Sealed { name: String },
}

/// Motion estimator errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EstimatorError {
    /// `estimate` was called before a successful `create()`, or a continuation
    /// estimate had no retained reference.
    #[error("Motion estimator is not ready")]
    NotReady,

    #[error("Motion estimator allocation of {requested} bytes failed: {reason}")]
    AllocationFailure { requested: usize, reason: String },

    #[error("Picture geometry mismatch: estimator configured for {expected}, got {got}")]
    GeometryMismatch {
        expected: Resolution,
        got: Resolution,
    },

    #[error("Unsupported estimation mode {mode}")]
    UnsupportedMode { mode: u32 },

    #[error("Invalid estimator geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unknown motion estimator: {name}")]
    UnknownEstimator { name: String },

    #[error("Distortion mask has {got} entries, expected {expected}")]
    MaskLength { expected: usize, got: usize },
}

/// Sample plane construction errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Plane data size mismatch: expected {expected} bytes, got {got}")]
    SizeMismatch { expected: usize, got: usize },
}

/// Convenience Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
