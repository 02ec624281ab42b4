//! Error types for field description lookup and property extraction.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while locating a field description.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("field name is empty")]
    EmptyName,

    #[error("no field at \"{name}\"")]
    FieldNotFound { name: String },

    #[error("cannot descend into \"{segment}\" of \"{name}\": {actual} has no children")]
    NotAContainer {
        name: String,
        segment: String,
        actual: String,
    },
}

impl LocateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors while loading description trees and value documents.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            LoadError::InvalidJson { .. } => 2,
        }
    }
}

/// Errors while assembling a property bag.
///
/// Only surfaced in strict mode; otherwise the assembler logs and falls
/// back to the unconstrained "mixed" bag.
#[derive(Debug, Error)]
pub enum PropsError {
    #[error("no field description for \"{name}\"")]
    MissingDescription { name: String },

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error("invalid pattern /{pattern}/ on \"{name}\": {source}")]
    InvalidPattern {
        name: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl PropsError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            PropsError::Locate(e) => e.exit_code(),
            _ => 2,
        }
    }
}

/// Failure of a reference to produce a value.
///
/// Never propagated past the resolver: a reference that fails resolves
/// to undefined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("nothing at \"{path}\"")]
    PathNotFound { path: String },

    #[error("context reference \"{key}\" used without a context")]
    MissingContext { key: String },

    #[error("reference \"{key}\" failed: {message}")]
    Getter { key: String, message: String },
}
