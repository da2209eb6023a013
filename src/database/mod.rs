//! Relational writeback layer

pub mod chunk;
pub mod postgres;

pub use postgres::PostgresSink;

use async_trait::async_trait;

use crate::processors::WritebackOp;

/// Consumer side of the writeback channel.
///
/// Implementations absorb persistence failures internally (logging per
/// chunk) so one bad batch never takes down the pipeline.
#[async_trait]
pub trait WritebackSink: Send + Sync {
    async fn persist(&self, ops: Vec<WritebackOp>);
}
