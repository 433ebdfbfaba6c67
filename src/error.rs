//! # Error Types
//!
//! Custom error types for the payload station using `thiserror`.

use thiserror::Error;

/// Main error type for the payload station
#[derive(Debug, Error)]
pub enum StationError {
    /// A four-line frame could not be decoded; the partial lines are discarded
    #[error("Decode error: {reason} (partial frame: {partial:?})")]
    Decode {
        reason: String,
        partial: Vec<String>,
    },

    /// A record's value does not match the shape its sensor kind expects
    #[error("Coercion error: {kind} value {value:?}: {reason}")]
    Coercion {
        kind: String,
        value: String,
        reason: String,
    },

    /// Outbound command could not be written to the device
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Operator command rejected before serialization
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Durable store could not be appended to or its tail could not be located
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// The telemetry source reached end of stream
    #[error("Telemetry source closed")]
    SourceClosed,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StationError {
    /// Per-record errors that must never stop ingestion.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Coercion { .. })
    }
}

/// Result type alias for the payload station
pub type Result<T> = std::result::Result<T, StationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let decode = StationError::Decode {
            reason: "read timed out".to_string(),
            partial: vec!["2024-01-01".to_string()],
        };
        assert!(decode.is_transient());
        assert!(!StationError::SourceClosed.is_transient());
        assert!(!StationError::Persistence("tail".to_string()).is_transient());
    }

    #[test]
    fn test_decode_error_message_carries_partial_lines() {
        let err = StationError::Decode {
            reason: "invalid UTF-8 on line 3".to_string(),
            partial: vec!["2024-01-01".to_string(), "5".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("invalid UTF-8 on line 3"));
        assert!(msg.contains("2024-01-01"));
    }
}
