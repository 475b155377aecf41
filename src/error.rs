//! Error types for the seamless tile store.
//!
//! Identifier errors (`DuplicateId`, `NotFound`, `GeometryMutation`) signal
//! caller bugs and are never retried. Transport failures surface as `Io` or
//! `Storage`; a tile that simply has no data is not an error at all.

use crate::feature::FeatureId;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the store, the tile writers and the extractor.
#[derive(Debug, Error)]
pub enum SeamlessError {
    /// A feature with this ID is already present in the store
    #[error("ID {0} already present in store")]
    DuplicateId(FeatureId),

    /// No feature with this ID exists
    #[error("feature {0} does not exist in store")]
    NotFound(FeatureId),

    /// An update tried to replace the geometry of a stored feature
    #[error("feature {0}: geometry cannot change after insertion")]
    GeometryMutation(FeatureId),

    /// The feature geometry has no envelope and cannot be placed on the tile grid
    #[error("feature {0} has an empty geometry")]
    EmptyGeometry(FeatureId),

    /// Filesystem or stream failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Object store transport failure (anything other than "object not found")
    #[error("storage error: {0}")]
    Storage(String),

    /// Background uploads did not finish in time; completed uploads are kept
    #[error("{pending} upload(s) still pending after {waited:?}")]
    Timeout { pending: usize, waited: Duration },

    /// A background upload task failed
    #[error("upload of '{key}' failed: {reason}")]
    UploadFailed { key: String, reason: String },

    /// Feature collection could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// Bytes are not a feature collection this crate understands
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Writer and reader disagree on coordinate precision
    #[error("precision mismatch: expected {expected} decimal digits, found {found}")]
    PrecisionMismatch { expected: u8, found: u8 },

    /// Query rectangle is inverted or not finite
    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Only polygons and multipolygons are stored
    #[error("unsupported geometry: {0}")]
    UnsupportedGeometry(String),
}

impl SeamlessError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True for errors that indicate a caller bug rather than an environment failure.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateId(_)
                | Self::NotFound(_)
                | Self::GeometryMutation(_)
                | Self::EmptyGeometry(_)
        )
    }
}

impl From<bincode::Error> for SeamlessError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(io) => SeamlessError::Io(io),
            other => SeamlessError::Codec(other.to_string()),
        }
    }
}

/// Result type alias for seamless operations
pub type Result<T> = std::result::Result<T, SeamlessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_programming_errors() {
        assert!(SeamlessError::DuplicateId(7).is_programming_error());
        assert!(SeamlessError::NotFound(7).is_programming_error());
        assert!(!SeamlessError::storage("connection reset").is_programming_error());
    }

    #[test]
    fn test_bincode_io_maps_to_io() {
        let err: bincode::Error = Box::new(bincode::ErrorKind::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "eof",
        )));
        assert!(matches!(SeamlessError::from(err), SeamlessError::Io(_)));
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            SeamlessError::DuplicateId(42).to_string(),
            "ID 42 already present in store"
        );
        let err = SeamlessError::PrecisionMismatch {
            expected: 6,
            found: 12,
        };
        assert!(err.to_string().contains("expected 6"));
    }
}
