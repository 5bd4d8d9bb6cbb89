//! Error handling for Mixforge
//!
//! Every error carries a stable code and, where it helps, recovery
//! suggestions. Tool invocations never let these escape to the controller;
//! they are turned into JSON payloads via [`MixerError::to_payload`].

use serde_json::{json, Value};
use thiserror::Error;

/// Result type alias for Mixforge operations
pub type Result<T> = std::result::Result<T, MixerError>;

/// Main error type for Mixforge operations
#[derive(Error, Debug)]
pub enum MixerError {
    // Input Errors
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("{reason}")]
    NoValidInput { reason: String },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Invalid parameter '{param}': got {value}, expected {expected}")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // Collaborator Errors
    #[error("{service} failed: {reason}")]
    DependencyFailure { service: String, reason: String },

    #[error("Malformed response from {service}: {reason}")]
    MalformedResponse { service: String, reason: String },

    #[error("Unknown operation: {name}")]
    UnknownOperation { name: String },

    // Processing Errors
    #[error("Processing error: {reason}")]
    ProcessingError { reason: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MixerError {
    /// Shorthand for a failed call into an external capability
    pub fn dependency(service: &str, reason: impl std::fmt::Display) -> Self {
        MixerError::DependencyFailure {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            MixerError::NotFound { .. } => "NOT_FOUND",
            MixerError::NoValidInput { .. } => "NO_VALID_INPUT",
            MixerError::InvalidAudio { .. } => "INVALID_AUDIO",
            MixerError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            MixerError::InvalidParameter { .. } => "INVALID_PARAMETER",
            MixerError::DependencyFailure { .. } => "DEPENDENCY_FAILURE",
            MixerError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            MixerError::UnknownOperation { .. } => "UNKNOWN_OPERATION",
            MixerError::ProcessingError { .. } => "PROCESSING_ERROR",
            MixerError::Config { .. } => "CONFIG_ERROR",
            MixerError::Io(_) => "IO_ERROR",
            MixerError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable at the calling component's boundary
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MixerError::NotFound { .. }
                | MixerError::DependencyFailure { .. }
                | MixerError::MalformedResponse { .. }
                | MixerError::InvalidAudio { .. }
                | MixerError::UnsupportedFormat { .. }
                | MixerError::UnknownOperation { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            MixerError::NotFound { .. } => vec![
                "Check the file path is correct",
                "Run discovery again to re-download the track",
            ],
            MixerError::NoValidInput { .. } => vec![
                "Check that the discovered files exist in the music directory",
                "Supported inputs: WAV, MP3, FLAC, OGG",
            ],
            MixerError::InvalidAudio { .. } => vec![
                "The file may be corrupted or truncated - try downloading it again",
                "Try converting the file to WAV first",
            ],
            MixerError::DependencyFailure { .. } => vec![
                "Check network connectivity and API keys",
                "Retry the operation; the service may be temporarily unavailable",
            ],
            MixerError::Config { .. } => vec![
                "Run 'mixforge-cli --setup' to create a configuration template",
            ],
            _ => vec![],
        }
    }

    /// Render this error as the structured payload appended to conversation state
    pub fn to_payload(&self) -> Value {
        json!({
            "error": self.to_string(),
            "error_code": self.error_code(),
            "recoverable": self.is_recoverable(),
        })
    }
}
