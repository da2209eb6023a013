//! Tail loop over the node's trace stream
//!
//! The watcher owns the only read handle on the trace source. It must never
//! die on a recoverable error: transport failures are reported on the error
//! channel and the tail restarts from the tracked offset after one fixed
//! backoff unit. The stream is expected to be truncated or rotated
//! externally, so transient unavailability is tolerated indefinitely.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::envelope::{parse_envelope, Operation, TraceOperation};
use crate::error::WatchError;

enum TailExit {
    /// Stop signal observed or the downstream channel closed.
    Stopped,
    /// Caught up with the end of the stream; reopen after the backoff.
    EndOfStream,
}

/// Tails the trace source and forwards accepted operations downstream.
///
/// Dispatch goes through a bounded channel: when the coordinator falls
/// behind, backpressure lands here instead of growing an unbounded task set.
pub struct TraceWatcher {
    path: PathBuf,
    watched: Vec<Operation>,
    retry_delay: Duration,
    ops_tx: mpsc::Sender<TraceOperation>,
    error_tx: mpsc::UnboundedSender<WatchError>,
    shutdown: watch::Receiver<bool>,
    offset: u64,
}

impl TraceWatcher {
    pub fn new(
        path: PathBuf,
        watched: Vec<Operation>,
        retry_delay: Duration,
        ops_tx: mpsc::Sender<TraceOperation>,
        error_tx: mpsc::UnboundedSender<WatchError>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            path,
            watched,
            retry_delay,
            ops_tx,
            error_tx,
            shutdown,
            offset: 0,
        }
    }

    /// Run until the stop signal fires. Never returns on recoverable error.
    pub async fn watch(mut self) {
        info!(path = %self.path.display(), "starting trace watcher");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            match self.tail().await {
                Ok(TailExit::Stopped) => break,
                Ok(TailExit::EndOfStream) => {
                    debug!("trace source drained, reopening after backoff");
                }
                Err(e) => {
                    let _ = self.error_tx.send(e);
                }
            }

            tokio::select! {
                _ = sleep(self.retry_delay) => {}
                _ = self.shutdown.changed() => break,
            }
        }

        info!("trace watcher stopped");
    }

    async fn tail(&mut self) -> Result<TailExit, WatchError> {
        let mut file = File::open(&self.path)
            .await
            .map_err(|source| WatchError::Open {
                path: self.path.clone(),
                source,
            })?;

        // Rotated or truncated upstream: start over rather than seeking
        // past the end of the new stream.
        let len = file.metadata().await?.len();
        if self.offset > len {
            warn!(
                offset = self.offset,
                len, "trace source shrank, restarting from the beginning"
            );
            self.offset = 0;
        }
        file.seek(SeekFrom::Start(self.offset)).await?;

        let mut lines = BufReader::new(file).lines();
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => return Ok(TailExit::Stopped),
                line = lines.next_line() => {
                    match line? {
                        None => return Ok(TailExit::EndOfStream),
                        Some(line) => {
                            self.offset += line.len() as u64 + 1;
                            if !self.accept(&line).await {
                                return Ok(TailExit::Stopped);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Filter, parse and forward one raw line. Returns false once the
    /// downstream channel is gone.
    async fn accept(&mut self, line: &str) -> bool {
        if !self.watched.is_empty() && !self.wanted(line) {
            return true;
        }

        let op = match parse_envelope(line) {
            Ok(op) => op,
            Err(e) => {
                // Malformed envelopes never stop the loop.
                let _ = self.error_tx.send(e);
                return true;
            }
        };

        // A write with an empty value is a deletion artifact upstream, not
        // meaningful state.
        if op.operation == Operation::Write && op.value.is_empty() {
            return true;
        }

        self.ops_tx.send(op).await.is_ok()
    }

    /// Cheap substring pre-filter on the raw line, so discarded operations
    /// never pay for JSON decoding.
    fn wanted(&self, line: &str) -> bool {
        self.watched.iter().any(|op| line.contains(op.filter_token()))
    }
}
