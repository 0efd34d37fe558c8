//! Error types for hearth.
//!
//! Faults raised by submitted code are NOT represented here: they travel back
//! to the caller as a normal `ExecuteResult` with `success == false`. This
//! enum covers transport, liveness, contention and timeout faults.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the hearth library.
#[derive(Debug, Error)]
pub enum KernelError {
    // Transport faults
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The kernel answered with an error document.
    #[error("Kernel error: {message}")]
    Remote { message: String },

    // Liveness faults
    #[error("Kernel unreachable at {addr}")]
    Unreachable { addr: String },

    #[error("Kernel start failed: {message}")]
    StartFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Kernel unresponsive: connection closed without a reply")]
    Unresponsive,

    // Contention faults
    #[error("Kernel busy: connection reset while another request was running")]
    Busy,

    #[error("Timed out after {0:?}; the execution may still be running in the kernel")]
    Timeout(Duration),

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for hearth operations.
pub type Result<T> = std::result::Result<T, KernelError>;

impl From<std::io::Error> for KernelError {
    fn from(err: std::io::Error) -> Self {
        KernelError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl KernelError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        KernelError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        KernelError::Protocol {
            message: message.into(),
        }
    }

    /// Check if this error should trigger a retry of the whole exchange.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KernelError::Unreachable { .. } | KernelError::Unresponsive | KernelError::Busy
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KernelError::Unreachable {
            addr: "127.0.0.1:9999".into(),
        };
        assert_eq!(err.to_string(), "Kernel unreachable at 127.0.0.1:9999");

        let err = KernelError::StartFailed {
            message: "process exited".into(),
            exit_code: Some(1),
        };
        assert!(err.to_string().contains("process exited"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(KernelError::Busy.is_retryable());
        assert!(KernelError::Unresponsive.is_retryable());
        assert!(!KernelError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!KernelError::protocol("bad frame").is_retryable());
    }

    #[test]
    fn test_io_conversion_keeps_message() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: KernelError = io.into();
        assert!(matches!(err, KernelError::Io { ref message, .. } if message == "missing"));
    }
}
