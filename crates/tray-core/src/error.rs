//! Error types for tray-core.
//!
//! This module defines all error types that can occur while discovering,
//! connecting to and polling tray sensor ranging tags.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy |
//! |------------|----------|
//! | [`Error::AdapterUnavailable`] | Fatal, abort the run |
//! | [`Error::AnchorCountMismatch`] | Fatal, fix configuration and restart |
//! | [`Error::NameUnavailable`] | Skip candidate, retried on next refresh |
//! | [`Error::ConnectionFailed`] | Retry with backoff on initial connect |
//! | [`Error::ServiceNotFound`] | One-shot reconnect and re-resolve |
//! | [`Error::CharacteristicNotFound`] | One-shot reconnect and re-resolve |
//! | [`Error::ReadFailed`] | Evict the tag at the end of the pass |
//! | [`Error::MalformedPayload`] | Evict the tag at the end of the pass |
//! | [`Error::Sink`] | Log, keep the tag |
//!
//! Use [`Error::is_fatal`] to tell run-ending errors apart from per-tag ones.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to ranging tags.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No usable Bluetooth adapter.
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// The advertisement carried no complete local name.
    #[error("Unable to read local name for {address}")]
    NameUnavailable {
        /// Address of the advertiser.
        address: String,
    },

    /// Could not establish a connection.
    #[error("Connection to {address} failed: {reason}")]
    ConnectionFailed {
        /// Address of the tag.
        address: String,
        /// Transport-level description of the failure.
        reason: String,
    },

    /// The ranging service is missing from the connection.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID that was not found.
        uuid: String,
    },

    /// The ranging characteristic is missing from the service.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
    },

    /// Operation attempted on a tag without a resolved session.
    #[error("Not connected to device")]
    NotConnected,

    /// A read failed and the reconnect-and-retry failed too.
    #[error("Read from {address} failed: {source}")]
    ReadFailed {
        /// Address of the tag.
        address: String,
        /// The failure that ended the repair attempt.
        #[source]
        source: Box<Error>,
    },

    /// The ranging payload had the wrong size.
    #[error("Malformed payload: expected {expected} bytes, got {actual}")]
    MalformedPayload {
        /// Expected payload size.
        expected: usize,
        /// Actual payload size received.
        actual: usize,
    },

    /// An explicit anchor id list does not match the number of reading slots.
    #[error("Anchor id count mismatch: expected {expected}, got {actual}")]
    AnchorCountMismatch {
        /// Number of reading slots.
        expected: usize,
        /// Number of anchor ids supplied.
        actual: usize,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// A record sink rejected a record.
    #[error("Sink error: {0}")]
    Sink(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a connection failure.
    pub fn connection_failed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a service not found error.
    pub fn service_not_found(uuid: impl ToString) -> Self {
        Self::ServiceNotFound {
            uuid: uuid.to_string(),
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl ToString) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.to_string(),
        }
    }

    /// Wrap a failure that survived the read repair path.
    pub fn read_failed(address: impl Into<String>, source: Error) -> Self {
        Self::ReadFailed {
            address: address.into(),
            source: Box::new(source),
        }
    }

    /// Create a sink error.
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this error must end the collection run.
    ///
    /// Adapter loss and an anchor id contract violation abort the run; every
    /// other error is confined to a single tag or record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AdapterUnavailable(_) | Self::AnchorCountMismatch { .. }
        )
    }
}

impl From<tray_types::ParseError> for Error {
    fn from(err: tray_types::ParseError) -> Self {
        match err {
            tray_types::ParseError::InvalidLength { expected, actual } => {
                Error::MalformedPayload { expected, actual }
            }
            tray_types::ParseError::AnchorCountMismatch { expected, actual } => {
                Error::AnchorCountMismatch { expected, actual }
            }
            tray_types::ParseError::InvalidValue(msg) => Error::InvalidConfig(msg),
            // Handle future ParseError variants (non_exhaustive)
            _ => Error::InvalidConfig(format!("Parse error: {}", err)),
        }
    }
}

/// Result type alias using tray-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NameUnavailable {
            address: "AA:AA:AA:AA:AA:01".to_string(),
        };
        assert!(err.to_string().contains("AA:AA:AA:AA:AA:01"));

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "Not connected to device");

        let err = Error::characteristic_not_found("5c3a659e");
        assert!(err.to_string().contains("5c3a659e"));

        let err = Error::timeout("read", Duration::from_secs(10));
        assert!(err.to_string().contains("read"));
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn test_read_failed_keeps_source() {
        use std::error::Error as _;

        let err = Error::read_failed("AA:AA:AA:AA:AA:01", Error::NotConnected);
        assert!(err.to_string().contains("AA:AA:AA:AA:AA:01"));
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("Not connected to device".to_string())
        );
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = tray_types::ParseError::InvalidLength {
            expected: 64,
            actual: 12,
        }
        .into();
        assert!(matches!(
            err,
            Error::MalformedPayload {
                expected: 64,
                actual: 12
            }
        ));

        let err: Error = tray_types::ParseError::AnchorCountMismatch {
            expected: 16,
            actual: 3,
        }
        .into();
        assert!(matches!(err, Error::AnchorCountMismatch { actual: 3, .. }));
    }

    #[test]
    fn test_is_fatal() {
        assert!(Error::AdapterUnavailable("no adapter".to_string()).is_fatal());
        assert!(
            Error::AnchorCountMismatch {
                expected: 16,
                actual: 2
            }
            .is_fatal()
        );
        assert!(!Error::NotConnected.is_fatal());
        assert!(!Error::sink("disk full").is_fatal());
        assert!(!Error::timeout("read characteristic", Duration::from_secs(10)).is_fatal());
        assert!(
            !Error::MalformedPayload {
                expected: 64,
                actual: 0
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }
}
