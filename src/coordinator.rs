//! Routing coordinator: height-boundary flushing and module dispatch
//!
//! The coordinator owns the registered module processors and the
//! last-observed block height. It is built once with its processors and
//! channels injected, and passed around explicitly.
//!
//! Ordering: the routing loop runs on a single task, so the
//! flush-then-route sequence at a height boundary is deterministic. Bulk
//! import bypasses the loop and calls [`Coordinator::route`] from worker
//! threads; the processors' internal locks make that safe.
//!
//! Lifecycle: the writeback channel must always have an active consumer
//! for the lifetime of the coordinator. Flushed batches are sent
//! unconditionally, and a vanished consumer loses them.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::ProcessError;
use crate::processors::{ModuleProcessor, WritebackOp};
use crate::trace::TraceOperation;

pub struct Coordinator {
    processors: Vec<Arc<dyn ModuleProcessor>>,
    last_height: u64,
    writeback_tx: mpsc::UnboundedSender<Vec<WritebackOp>>,
    error_tx: mpsc::UnboundedSender<ProcessError>,
}

impl Coordinator {
    pub fn new(
        processors: Vec<Arc<dyn ModuleProcessor>>,
        writeback_tx: mpsc::UnboundedSender<Vec<WritebackOp>>,
        error_tx: mpsc::UnboundedSender<ProcessError>,
    ) -> Self {
        Self {
            processors,
            last_height: 0,
            writeback_tx,
            error_tx,
        }
    }

    pub fn processors(&self) -> &[Arc<dyn ModuleProcessor>] {
        &self.processors
    }

    /// Apply the height-boundary rule, then route the operation.
    ///
    /// A height change (to any non-zero height) flushes every module
    /// before the new block's first operation is processed, so one flush
    /// batch holds exactly one block interval per module.
    pub fn handle(&mut self, op: &TraceOperation) {
        if op.block_height != self.last_height && op.block_height != 0 {
            self.flush_all();
            self.last_height = op.block_height;
        }
        self.route(op);
    }

    /// Route one operation to its processors without touching the height
    /// cursor. Safe to call from multiple threads.
    pub fn route(&self, op: &TraceOperation) {
        match op.suggested_processor {
            Some(tag) => {
                if let Some(processor) = self.processors.iter().find(|p| p.name() == tag) {
                    if processor.owns_key(&op.key) {
                        self.process_one(processor.as_ref(), op);
                    }
                } else {
                    warn!(module = tag, "suggested processor is not registered");
                }
            }
            None => {
                // An error in one module never stops routing to the rest.
                for processor in &self.processors {
                    if processor.owns_key(&op.key) {
                        self.process_one(processor.as_ref(), op);
                    }
                }
            }
        }
    }

    fn process_one(&self, processor: &dyn ModuleProcessor, op: &TraceOperation) {
        if let Err(source) = processor.process(op) {
            let _ = self.error_tx.send(ProcessError {
                module: processor.name(),
                operation: op.operation,
                key: hex::encode(&op.key),
                source,
            });
        }
    }

    /// Drain every module's caches and forward the combined batch.
    pub fn flush_all(&self) {
        let mut batch = Vec::new();
        for processor in &self.processors {
            batch.extend(processor.flush());
        }
        if batch.is_empty() {
            return;
        }

        debug!(
            ops = batch.len(),
            rows = batch.iter().map(|op| op.rows.len()).sum::<usize>(),
            height = self.last_height,
            "flushing writeback batch"
        );
        if self.writeback_tx.send(batch).is_err() {
            warn!("writeback channel closed, dropping flushed batch");
        }
    }

    /// Run the routing loop until the operation channel closes or the stop
    /// signal fires. A stop mid-block leaves that block's caches
    /// unflushed; the caller decides whether to issue a final flush.
    pub async fn run(
        mut self,
        mut ops_rx: mpsc::Receiver<TraceOperation>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                op = ops_rx.recv() => match op {
                    Some(op) => self.handle(&op),
                    None => break,
                },
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::keys;
    use crate::processors::{build_processors, test_context, RowBatch};
    use crate::trace::Operation;

    fn balance_write(addr: &[u8], denom: &str, amount: &str, height: u64) -> TraceOperation {
        let mut key = vec![keys::prefix::BANK_BALANCE, addr.len() as u8];
        key.extend_from_slice(addr);
        key.extend_from_slice(denom.as_bytes());
        TraceOperation {
            operation: Operation::Write,
            key,
            value: amount.as_bytes().to_vec(),
            block_height: height,
            tx_hash: String::new(),
            suggested_processor: None,
        }
    }

    fn coordinator() -> (
        Coordinator,
        mpsc::UnboundedReceiver<Vec<WritebackOp>>,
        mpsc::UnboundedReceiver<ProcessError>,
    ) {
        let ctx = test_context();
        let processors = build_processors(&[], &ctx).unwrap();
        let (wb_tx, wb_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        (Coordinator::new(processors, wb_tx, err_tx), wb_rx, err_rx)
    }

    #[test]
    fn same_height_never_flushes() {
        let (mut c, mut wb_rx, _err_rx) = coordinator();
        for i in 0..10 {
            c.handle(&balance_write(&[0xAA; 20], "stake", &format!("{}", i + 1), 5));
        }
        assert!(wb_rx.try_recv().is_err());
    }

    #[test]
    fn height_zero_never_flushes() {
        let (mut c, mut wb_rx, _err_rx) = coordinator();
        c.handle(&balance_write(&[0xAA; 20], "stake", "1", 5));
        c.handle(&balance_write(&[0xAB; 20], "stake", "2", 0));
        assert!(wb_rx.try_recv().is_err());
    }

    #[test]
    fn height_boundary_flushes_coalesced_rows() {
        let (mut c, mut wb_rx, _err_rx) = coordinator();
        c.handle(&balance_write(&[0xAA; 20], "stake", "100", 5));
        c.handle(&balance_write(&[0xAA; 20], "stake", "250", 5));
        // First operation of the next block triggers the flush.
        c.handle(&balance_write(&[0xBB; 20], "stake", "1", 6));

        let batch = wb_rx.try_recv().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].module, "bank");
        let RowBatch::Balances(rows) = &batch[0].rows else {
            panic!("wrong batch type");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, "250");
        assert_eq!(rows[0].height, 5);

        // The height-6 write is still cached, not flushed.
        assert!(wb_rx.try_recv().is_err());
    }

    #[test]
    fn decode_errors_are_tagged_and_do_not_stop_routing() {
        let (mut c, mut wb_rx, mut err_rx) = coordinator();
        // Invalid amount for the bank module.
        c.handle(&balance_write(&[0xAA; 20], "stake", "12x", 5));
        let err = err_rx.try_recv().unwrap();
        assert_eq!(err.module, "bank");
        assert_eq!(err.operation, Operation::Write);

        // The pipeline keeps accepting good operations afterwards.
        c.handle(&balance_write(&[0xAA; 20], "stake", "77", 5));
        c.handle(&balance_write(&[0xAA; 20], "stake", "78", 6));
        let batch = wb_rx.try_recv().unwrap();
        assert_eq!(batch[0].rows.len(), 1);
    }

    #[test]
    fn suggested_processor_restricts_routing() {
        let (c, _wb_rx, mut err_rx) = coordinator();
        // A bank-shaped key suggested to the denom-traces module: the
        // predicate rejects it and nothing is processed or reported.
        let mut op = balance_write(&[0xAA; 20], "stake", "1", 5);
        op.suggested_processor = Some("denom-traces");
        c.route(&op);
        assert!(err_rx.try_recv().is_err());

        let mut op = balance_write(&[0xAA; 20], "stake", "1", 5);
        op.suggested_processor = Some("bank");
        c.route(&op);
        let flushed: Vec<_> = c
            .processors()
            .iter()
            .flat_map(|p| p.flush())
            .collect();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].module, "bank");
    }

    #[tokio::test]
    async fn run_loop_stops_on_signal_without_flushing() {
        let (c, mut wb_rx, _err_rx) = coordinator();
        let (ops_tx, ops_rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(c.run(ops_rx, stop_rx));
        ops_tx
            .send(balance_write(&[0xAA; 20], "stake", "9", 5))
            .await
            .unwrap();
        // Let the loop drain the channel before signalling.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();

        let c = handle.await.unwrap();
        // The open block is deliberately unflushed on stop.
        assert!(wb_rx.try_recv().is_err());

        // The caller drains it with one final flush.
        c.flush_all();
        let batch = wb_rx.try_recv().unwrap();
        assert_eq!(batch[0].rows.len(), 1);
    }
}
