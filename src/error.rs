//! Error handling for the batch miner
//!
//! Error types covering configuration, header decoding and device failures.
//! Cooperative cancellation is not an error: it is reported through
//! [`crate::miner::MiningOutcome::Stopped`].

use thiserror::Error;

/// Result type alias for mining operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the batch miner
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking device task panicked or was aborted
    #[error("Device task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Header encoding errors
    #[error("Header error: {message}")]
    Header { message: String },

    /// Batch hashing device reported a failure status
    #[error("Device error: {device} (status {code}): {message}")]
    Device {
        device: String,
        code: i32,
        message: String,
    },

    /// Invalid state errors
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a header error
    pub fn header(message: impl Into<String>) -> Self {
        Self::Header {
            message: message.into(),
        }
    }

    /// Create a device failure carrying the device's status code
    pub fn device(device: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self::Device {
            device: device.into(),
            code,
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether this error came from the hashing device
    pub fn is_device_failure(&self) -> bool {
        matches!(self, Error::Device { .. } | Error::Join(_))
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Io(_) => "io",
            Error::Join(_) => "join",
            Error::Config { .. } => "config",
            Error::Header { .. } => "header",
            Error::Device { .. } => "device",
            Error::InvalidState { .. } => "invalid_state",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_display() {
        let err = Error::device("external", 3, "driver reset");
        assert_eq!(
            err.to_string(),
            "Device error: external (status 3): driver reset"
        );
        assert!(err.is_device_failure());
        assert_eq!(err.category(), "device");
    }

    #[test]
    fn test_config_error_is_not_device_failure() {
        let err = Error::config("batch width must be greater than 0");
        assert!(!err.is_device_failure());
        assert_eq!(err.category(), "config");
    }
}
