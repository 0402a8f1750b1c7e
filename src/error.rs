//! Error types for dataset building operations

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for dataset building operations
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Comprehensive error types for dataset building operations
#[derive(Error, Debug)]
pub enum DatasetError {
    /// A record (or the whole export) could not be parsed
    #[error("Malformed export {location}: {reason}")]
    MalformedExport { location: String, reason: String },

    /// The tag query string is not valid
    #[error("Invalid query syntax at position {position}: {reason}")]
    InvalidQuerySyntax { position: usize, reason: String },

    /// The image referenced by a record does not exist in any search location
    #[error("Image not found for record '{record_id}': {reference}")]
    ImageNotFound { record_id: String, reference: String },

    /// The image file exists but could not be read or is corrupt
    #[error("Image unreadable '{}': {reason}", path.display())]
    ImageUnreadable { path: PathBuf, reason: String },

    /// The image content is not a decodable format
    #[error("Unsupported format '{}': {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// Writing to the output directory failed
    #[error("Failed to {operation} '{}': {source}", path.display())]
    Write {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input/output errors outside of dataset writes (reading the export, config files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON (de)serialization errors for config files and sidecars
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DatasetError {
    /// Create a malformed export error for a specific line or row
    pub fn malformed<L: std::fmt::Display, S: Into<String>>(location: L, reason: S) -> Self {
        Self::MalformedExport {
            location: location.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a query syntax error at a byte offset of the query string
    pub fn query_syntax<S: Into<String>>(position: usize, reason: S) -> Self {
        Self::InvalidQuerySyntax {
            position,
            reason: reason.into(),
        }
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an image-not-found error
    pub fn image_not_found<I: Into<String>, R: std::fmt::Display>(record_id: I, reference: R) -> Self {
        Self::ImageNotFound {
            record_id: record_id.into(),
            reference: reference.to_string(),
        }
    }

    /// Create an image-unreadable error
    pub fn image_unreadable<P: AsRef<Path>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::ImageUnreadable {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported format error
    pub fn unsupported_format<P: AsRef<Path>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::UnsupportedFormat {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a dataset write error with operation context
    pub fn write_error<P: AsRef<Path>>(operation: &str, path: P, source: std::io::Error) -> Self {
        Self::Write {
            operation: operation.to_string(),
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: &std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Errors that only affect a single record; the run continues after them.
    #[must_use]
    pub fn is_record_local(&self) -> bool {
        matches!(
            self,
            Self::MalformedExport { .. }
                | Self::ImageNotFound { .. }
                | Self::ImageUnreadable { .. }
                | Self::UnsupportedFormat { .. }
        )
    }
}
