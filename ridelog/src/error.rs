//! Error handling for store and repository operations.
//!
//! Every repository call surfaces failures as a typed [`StoreError`]. Nothing is
//! retried here; retry policy belongs to the caller.

use std::fmt;

use thiserror::Error;

/// Record kind an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Bike,
    Ride,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Bike => f.write_str("bike"),
            RecordKind::Ride => f.write_str("ride"),
        }
    }
}

/// Error type for store and repository operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Requested id is absent
    #[error("{kind} '{id}' not found")]
    NotFound { kind: RecordKind, id: String },

    /// SQLite rejected the statement or the transaction could not commit
    #[error("write failed: {message}")]
    WriteFailed { message: String },

    /// Stored row cannot be converted back into a domain value
    #[error("{kind} '{id}' cannot be mapped: {reason}")]
    MappingFailed {
        kind: RecordKind,
        id: String,
        reason: String,
    },

    /// Ride references a bike that does not exist
    #[error("bike '{bike_id}' referenced by ride does not exist")]
    ParentNotFound { bike_id: String },

    /// Store lock poisoned or other internal failure
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl StoreError {
    pub fn not_found(kind: RecordKind, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn mapping(kind: RecordKind, id: impl ToString, reason: impl Into<String>) -> Self {
        StoreError::MappingFailed {
            kind,
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::WriteFailed {
            message: e.to_string(),
        }
    }
}

impl From<rusqlite_migration::Error> for StoreError {
    fn from(e: rusqlite_migration::Error) -> Self {
        StoreError::WriteFailed {
            message: format!("migration failed: {}", e),
        }
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Extension trait for converting lookups into `NotFound` errors.
pub trait OptionExt<T> {
    fn ok_or_not_found(self, kind: RecordKind, id: impl ToString) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, kind: RecordKind, id: impl ToString) -> Result<T> {
        self.ok_or_else(|| StoreError::not_found(kind, id))
    }
}
