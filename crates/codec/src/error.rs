//! Error types for configuration loading (thiserror-based).

use rtv_common::CodecError;
use thiserror::Error;

/// Errors that can occur while loading or validating a session configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File I/O error (read, path resolution).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file does not exist.
    #[error("Config file not found: {path}")]
    NotFound { path: String },

    /// The configuration parsed but describes an unusable session.
    #[error("Invalid config: {reason}")]
    Invalid { reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for CodecError {
    fn from(err: ConfigError) -> Self {
        CodecError::InvalidConfig(err.to_string())
    }
}

/// Convenience Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = ConfigError::NotFound {
            path: "/tmp/missing.json".into(),
        };
        assert!(err.to_string().contains("missing.json"));

        let err = ConfigError::invalid("block size must be > 0");
        assert_eq!(err.to_string(), "Invalid config: block size must be > 0");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ConfigError = io_err.into();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn converts_into_codec_error() {
        let err: CodecError = ConfigError::invalid("bad quality").into();
        assert!(matches!(err, CodecError::InvalidConfig(ref msg) if msg.contains("bad quality")));
    }
}
