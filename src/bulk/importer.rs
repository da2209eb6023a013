//! Parallel snapshot importer
//!
//! One worker per configured module scans that module's keyspace and
//! pushes every record through the ordinary routing path, tagged with the
//! module as the suggested processor and the snapshot's committed height.
//! A background task drains the error and writeback channels for the whole
//! run; the join set is the completion barrier. After every worker has
//! reported, one final flush per module produces the batches that get
//! persisted.
//!
//! Worker errors are fatal: they are collected across workers and fail
//! the import as one aggregated error.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::snapshot::{Keyspaces, SnapshotStore};
use crate::coordinator::Coordinator;
use crate::database::WritebackSink;
use crate::error::{ImportError, ProcessError};
use crate::processors::WritebackOp;
use crate::trace::{Operation, TraceOperation};

#[derive(Debug, Default)]
pub struct ImportStats {
    pub snapshot_height: u64,
    /// Records scanned per module.
    pub records: HashMap<&'static str, u64>,
    pub batches: usize,
    pub rows: usize,
}

pub struct BulkImporter {
    coordinator: Arc<Coordinator>,
    snapshot: Arc<SnapshotStore>,
}

impl BulkImporter {
    pub fn new(coordinator: Arc<Coordinator>, snapshot: Arc<SnapshotStore>) -> Self {
        Self {
            coordinator,
            snapshot,
        }
    }

    pub async fn run(
        self,
        writeback_rx: mpsc::UnboundedReceiver<Vec<WritebackOp>>,
        error_rx: mpsc::UnboundedReceiver<ProcessError>,
        sink: &dyn WritebackSink,
    ) -> Result<ImportStats, ImportError> {
        let snapshot_height = self.snapshot.latest_height()?;
        info!(height = snapshot_height, "starting bulk import");

        // The coordinator would stall with nobody on the other end of its
        // channels, so the drain starts before the first worker.
        let drain = tokio::spawn(drain_channels(writeback_rx, error_rx));

        let mut workers = JoinSet::new();
        for processor in self.coordinator.processors() {
            let module = processor.name();
            let Some(keyspace) = Keyspaces::for_module(module) else {
                return Err(ImportError::Worker {
                    module,
                    message: "no snapshot keyspace mapping".to_string(),
                });
            };
            let snapshot = self.snapshot.clone();
            let coordinator = self.coordinator.clone();

            workers.spawn_blocking(move || -> Result<(&'static str, u64), ImportError> {
                let mut count = 0u64;
                for item in snapshot.scan(keyspace)? {
                    let (key, value) = item.map_err(|e| ImportError::Worker {
                        module,
                        message: e.to_string(),
                    })?;
                    if value.is_empty() {
                        continue;
                    }
                    let op = TraceOperation {
                        operation: Operation::Write,
                        key: key.into_vec(),
                        value: value.into_vec(),
                        block_height: snapshot_height,
                        tx_hash: String::new(),
                        suggested_processor: Some(module),
                    };
                    coordinator.route(&op);
                    count += 1;
                }
                Ok((module, count))
            });
        }

        // Completion barrier: every worker reports here before the flush.
        let mut records = HashMap::new();
        let mut failures = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok((module, count))) => {
                    info!(module, records = count, "keyspace scan complete");
                    records.insert(module, count);
                }
                Ok(Err(e)) => failures.push(e),
                Err(e) => failures.push(ImportError::Worker {
                    module: "unknown",
                    message: e.to_string(),
                }),
            }
        }
        if !failures.is_empty() {
            return Err(if failures.len() == 1 {
                failures.pop().expect("one failure")
            } else {
                ImportError::Workers(failures)
            });
        }

        // One final flush per module, then close the channels so the drain
        // task can finish and hand over what it collected.
        self.coordinator.flush_all();
        drop(self.coordinator);

        let batches = drain.await.map_err(|e| ImportError::Worker {
            module: "drain",
            message: e.to_string(),
        })?;

        let stats = ImportStats {
            snapshot_height,
            records,
            batches: batches.len(),
            rows: batches
                .iter()
                .flatten()
                .map(|op| op.rows.len())
                .sum(),
        };

        for batch in batches {
            sink.persist(batch).await;
        }

        info!(
            height = stats.snapshot_height,
            rows = stats.rows,
            "bulk import complete"
        );
        Ok(stats)
    }
}

/// Drain the coordinator's channels until both close, collecting flushed
/// batches and logging processing errors as they arrive.
async fn drain_channels(
    mut writeback_rx: mpsc::UnboundedReceiver<Vec<WritebackOp>>,
    mut error_rx: mpsc::UnboundedReceiver<ProcessError>,
) -> Vec<Vec<WritebackOp>> {
    let mut batches = Vec::new();
    let mut writebacks_open = true;
    let mut errors_open = true;

    while writebacks_open || errors_open {
        tokio::select! {
            batch = writeback_rx.recv(), if writebacks_open => match batch {
                Some(b) => batches.push(b),
                None => writebacks_open = false,
            },
            err = error_rx.recv(), if errors_open => match err {
                Some(e) => warn!("import decode error: {e}"),
                None => errors_open = false,
            },
        }
    }

    batches
}
