//! Error types for report computation.
//!
//! Store and configuration failures are real errors. Malformed records and
//! per-unit store failures are recoverable: the aggregator turns them into
//! [`Diagnostic`](crate::model::Diagnostic) entries next to the partial result.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A read against the record store failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The store rejected or could not serve the request.
    #[error("{operation}({key}) failed: {message}")]
    Unavailable {
        operation: &'static str,
        key: String,
        message: String,
    },

    /// The store did not answer within the configured timeout.
    #[error("{operation}({key}) timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        key: String,
        timeout_ms: u64,
    },

    /// A stored document could not be decoded at all.
    #[error("malformed {collection} document: {message}")]
    Malformed {
        collection: &'static str,
        message: String,
    },
}

impl StoreError {
    /// Returns `true` if the error was caused by the call timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

/// A record was readable but its content cannot be used for scoring.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputationError {
    #[error("{entity} {id}: unparseable {field} '{value}'")]
    InvalidTimestamp {
        entity: &'static str,
        id: String,
        field: &'static str,
        value: String,
    },

    #[error("{entity} {id}: missing required field {field}")]
    MissingField {
        entity: &'static str,
        id: String,
        field: &'static str,
    },

    #[error("{entity} {id}: invalid {field} ({reason})")]
    InvalidValue {
        entity: &'static str,
        id: String,
        field: &'static str,
        reason: String,
    },
}

/// A report request was rejected before any store read was issued.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("date range start {start} is after end {end}")]
    InvalidDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("{field} must not be blank")]
    BlankValue { field: &'static str },

    #[error("{field} must be at least 1")]
    ZeroLimit { field: &'static str },
}

/// Errors that abort a whole report request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReportError {
    #[error("invalid report request: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The teacher's course listing failed, so no unit of work exists.
    #[error("course listing failed: {0}")]
    Store(#[from] StoreError),

    #[error("report request was cancelled")]
    Cancelled,
}
