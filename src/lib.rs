//! Change-data-capture indexer for a chain's state-store trace stream
//!
//! Tails the node's key/value trace log, decodes raw operations into typed
//! domain rows through per-module processors, coalesces them per block
//! height and flushes batched upserts/deletes into PostgreSQL. A bulk mode
//! backfills the store from a read-only snapshot of the full key space
//! through the same routing path.

pub mod bulk;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod decoder;
pub mod error;
pub mod models;
pub mod processors;
pub mod trace;

pub use config::IndexerConfig;
pub use coordinator::Coordinator;
pub use database::{PostgresSink, WritebackSink};
pub use processors::{ModuleProcessor, RowBatch, WritebackKind, WritebackOp};
pub use trace::{Operation, TraceOperation, TraceWatcher};
