//! Denom trace module processor

use super::cache::RowCache;
use super::{ModuleProcessor, ProcessorContext, RowBatch, WritebackKind, WritebackOp};
use crate::decoder::{ibc, keys};
use crate::error::DecodeError;
use crate::models::DenomTraceRow;
use crate::trace::TraceOperation;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS denom_traces (
        id BIGSERIAL PRIMARY KEY,
        chain_name TEXT NOT NULL,
        hash TEXT NOT NULL,
        path TEXT NOT NULL,
        base_denom TEXT NOT NULL,
        height BIGINT NOT NULL,
        UNIQUE (chain_name, hash)
    )"#,
];

/// Tracks fungible-token traces. The keyspace shares its prefix byte with
/// bank balances; the exact prefix+hash length is the distinguishing shape.
pub struct DenomTracesProcessor {
    chain_name: String,
    inserts: RowCache<String, DenomTraceRow>,
}

impl DenomTracesProcessor {
    pub fn new(ctx: &ProcessorContext) -> Self {
        Self {
            chain_name: ctx.chain_name.clone(),
            inserts: RowCache::new(),
        }
    }
}

impl ModuleProcessor for DenomTracesProcessor {
    fn name(&self) -> &'static str {
        "denom-traces"
    }

    fn owns_key(&self, key: &[u8]) -> bool {
        key.len() == keys::DENOM_TRACE_KEY_LEN && key[0] == keys::prefix::DENOM_TRACE
    }

    fn process(&self, op: &TraceOperation) -> Result<(), DecodeError> {
        if let Some(row) = ibc::denom_trace(&self.chain_name, op)? {
            self.inserts.put(row.hash.clone(), row);
        }
        Ok(())
    }

    fn flush(&self) -> Vec<WritebackOp> {
        let mut rows = self.inserts.drain();
        if rows.is_empty() {
            return Vec::new();
        }
        rows.sort_by(|a, b| a.hash.cmp(&b.hash));
        vec![WritebackOp {
            kind: WritebackKind::Upsert,
            module: self.name(),
            rows: RowBatch::DenomTraces(rows),
        }]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_context;
    use super::*;

    #[test]
    fn owns_exact_length_hash_keys() {
        let p = DenomTracesProcessor::new(&test_context());
        let mut key = vec![keys::prefix::DENOM_TRACE];
        key.extend_from_slice(&[0x5A; 32]);
        assert!(p.owns_key(&key));

        key.push(0x00);
        assert!(!p.owns_key(&key));
        assert!(!p.owns_key(&[keys::prefix::DENOM_TRACE]));
    }
}
