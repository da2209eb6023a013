//! Error taxonomy for the indexer core
//!
//! Errors that cross channel or task boundaries get their own type so the
//! consumers on the other side can log and classify them without string
//! matching. Wiring and constructor paths use `anyhow` instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::trace::Operation;

/// Errors raised on the trace-watching path. Transport errors are retried
/// indefinitely; envelope errors drop the offending line only.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to open trace source {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read from trace source: {0}")]
    Read(#[from] std::io::Error),

    #[error("malformed trace envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("invalid base64 in trace envelope {field}: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
}

/// Errors from turning a raw key/value pair into a domain row.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("key too short: got {got} bytes, need at least {need}")]
    KeyTooShort { need: usize, got: usize },

    #[error("invalid address segment of length {len} at key offset {offset}")]
    AddressSegment { len: usize, offset: usize },

    #[error("malformed protobuf value: {0}")]
    Proto(#[from] prost::DecodeError),

    #[error("malformed JSON state value: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid utf-8 in {what}")]
    Utf8 { what: &'static str },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl DecodeError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A decode failure tagged with the module and operation it came from.
/// Emitted on the coordinator's error channel; never aborts routing.
#[derive(Debug, Error)]
#[error("module {module} failed to process {operation:?} for key {key}: {source}")]
pub struct ProcessError {
    pub module: &'static str,
    pub operation: Operation,
    /// Hex rendering of the offending store key.
    pub key: String,
    #[source]
    pub source: DecodeError,
}

/// Errors from executing writeback batches against the relational store.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{module} upsert chunk affected 0 rows, expected {expected}")]
    NoRowsAffected { module: &'static str, expected: usize },
}

/// Errors from the bulk snapshot importer. Unlike the live pipeline these
/// are fatal: a failed keyspace scan fails the whole import.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to open snapshot: {0}")]
    Snapshot(#[from] rocksdb::Error),

    #[error("snapshot metadata missing or unreadable: {0}")]
    Metadata(String),

    #[error("import worker for module {module} failed: {message}")]
    Worker { module: &'static str, message: String },

    #[error("{} import workers failed: {}", .0.len(), format_worker_errors(.0))]
    Workers(Vec<ImportError>),
}

fn format_worker_errors(errors: &[ImportError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
