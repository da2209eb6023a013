//! Bulk backfill from a historical state snapshot

pub mod importer;
pub mod snapshot;

pub use importer::{BulkImporter, ImportStats};
pub use snapshot::{SnapshotMeta, SnapshotStore};
