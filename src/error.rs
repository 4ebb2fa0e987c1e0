//! Error types for the UAVTalk protocol engine.
//!
//! Errors fall into a small number of classes that callers handle differently:
//!
//! - **Load errors**: malformed or unsupported object definitions. These are the
//!   only fatal conditions; the offending definition is not registered.
//! - **Stream errors**: unknown objects, malformed frames and checksum
//!   mismatches. The engine logs these, drops the frame and keeps decoding.
//! - **Serialization errors**: value/layout mismatches when packing or a short
//!   buffer when unpacking. The operation fails and the caller decides whether
//!   to retry.
//!
//! ```rust
//! use uavtalk::UavTalkError;
//!
//! let error = UavTalkError::unknown_field_type("Attitude", "Roll", "double");
//! assert!(error.is_load_error());
//! assert!(!error.is_retryable());
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for UAVTalk operations.
pub type Result<T, E = UavTalkError> = std::result::Result<T, E>;

/// Main error type for UAVTalk operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UavTalkError {
    #[error("Unknown field type '{field_type}' for field '{field}' of object '{object}'")]
    UnknownFieldType { object: String, field: String, field_type: String },

    #[error("Invalid definition for object '{object}': {details}")]
    InvalidDefinition { object: String, details: String },

    #[error("Object {object_id:#010x} ('{name}') is already registered")]
    DuplicateObject { object_id: u32, name: String },

    #[error("Unknown object: {key}")]
    UnknownObject { key: String },

    #[error("Malformed frame: {details}")]
    MalformedFrame { details: String },

    #[error("Checksum mismatch for object {object_id:#010x}: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { object_id: u32, expected: u8, actual: u8 },

    #[error("Serialization error in {context}: {details}")]
    Serialization { context: String, details: String },

    #[error("Definition file error: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {context}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Request for {key} was cancelled")]
    Cancelled { key: String },

    #[error("No tokio runtime is running on this thread")]
    NoRuntime,
}

impl UavTalkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            UavTalkError::MalformedFrame { .. } => true,
            UavTalkError::ChecksumMismatch { .. } => true,
            UavTalkError::Serialization { .. } => true,
            UavTalkError::Io { .. } => true,
            UavTalkError::UnknownObject { .. } => false,
            UavTalkError::UnknownFieldType { .. } => false,
            UavTalkError::InvalidDefinition { .. } => false,
            UavTalkError::DuplicateObject { .. } => false,
            UavTalkError::Json { .. } => false,
            UavTalkError::Cancelled { .. } => false,
            UavTalkError::NoRuntime => false,
        }
    }

    /// Returns whether this error aborts the loading of a definition.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            UavTalkError::UnknownFieldType { .. }
                | UavTalkError::InvalidDefinition { .. }
                | UavTalkError::DuplicateObject { .. }
                | UavTalkError::Io { .. }
                | UavTalkError::Json { .. }
        )
    }

    /// Helper constructor for unsupported field types.
    pub fn unknown_field_type(
        object: impl Into<String>,
        field: impl Into<String>,
        field_type: impl Into<String>,
    ) -> Self {
        UavTalkError::UnknownFieldType {
            object: object.into(),
            field: field.into(),
            field_type: field_type.into(),
        }
    }

    /// Helper constructor for structurally invalid definitions.
    pub fn invalid_definition(object: impl Into<String>, details: impl Into<String>) -> Self {
        UavTalkError::InvalidDefinition { object: object.into(), details: details.into() }
    }

    /// Helper constructor for lookups of unregistered objects.
    pub fn unknown_object(key: impl std::fmt::Display) -> Self {
        UavTalkError::UnknownObject { key: key.to_string() }
    }

    /// Helper constructor for malformed frames.
    pub fn malformed_frame(details: impl Into<String>) -> Self {
        UavTalkError::MalformedFrame { details: details.into() }
    }

    /// Helper constructor for serialization failures.
    pub fn serialization(context: impl Into<String>, details: impl Into<String>) -> Self {
        UavTalkError::Serialization { context: context.into(), details: details.into() }
    }

    /// Helper constructor for definition file errors with path context.
    pub fn io_error(path: PathBuf, source: std::io::Error) -> Self {
        UavTalkError::Io { path, source }
    }
}

impl From<std::io::Error> for UavTalkError {
    fn from(err: std::io::Error) -> Self {
        UavTalkError::Io { path: PathBuf::from("<unknown>"), source: err }
    }
}
