//! Trace stream ingestion: envelope parsing and the tail loop

mod envelope;
mod watcher;

pub use envelope::{parse_envelope, Operation, TraceOperation};
pub use watcher::TraceWatcher;
