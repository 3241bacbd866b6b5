//! Error types for data parsing in tray-types.

use thiserror::Error;

/// Errors that can occur when decoding tray sensor data.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in tray-core).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload does not have the exact length the protocol requires.
    #[error("Invalid payload length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required payload size.
        expected: usize,
        /// Actual payload size received.
        actual: usize,
    },

    /// An explicit anchor-identifier list does not cover every reading slot.
    #[error("Anchor count mismatch: reading has {expected} slots, got {actual} anchor ids")]
    AnchorCountMismatch {
        /// Number of slots in a reading.
        expected: usize,
        /// Number of anchor identifiers supplied.
        actual: usize,
    },

    /// A value could not be interpreted.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using tray-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
