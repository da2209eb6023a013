//! Delegation module processor
//!
//! Delegations support logical deletion: a full undelegation removes the
//! pair's record from the store, so this processor carries a delete cache
//! next to the insert cache. Within one flush interval a later write
//! cancels a pending delete for the same pair and vice versa.

use super::cache::RowCache;
use super::{ModuleProcessor, ProcessorContext, RowBatch, WritebackKind, WritebackOp};
use crate::decoder::{keys, staking};
use crate::error::DecodeError;
use crate::models::DelegationRow;
use crate::trace::TraceOperation;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS delegations (
        id BIGSERIAL PRIMARY KEY,
        chain_name TEXT NOT NULL,
        delegator_address TEXT NOT NULL,
        validator_address TEXT NOT NULL,
        amount NUMERIC NOT NULL,
        height BIGINT NOT NULL,
        UNIQUE (chain_name, delegator_address, validator_address)
    )"#,
    "CREATE INDEX IF NOT EXISTS delegations_delegator_idx ON delegations (delegator_address)",
];

pub struct DelegationsProcessor {
    chain_name: String,
    inserts: RowCache<(String, String), DelegationRow>,
    deletes: RowCache<(String, String), DelegationRow>,
}

impl DelegationsProcessor {
    pub fn new(ctx: &ProcessorContext) -> Self {
        Self {
            chain_name: ctx.chain_name.clone(),
            inserts: RowCache::new(),
            deletes: RowCache::new(),
        }
    }
}

impl ModuleProcessor for DelegationsProcessor {
    fn name(&self) -> &'static str {
        "delegations"
    }

    fn owns_key(&self, key: &[u8]) -> bool {
        keys::looks_like_pair_key(key, keys::prefix::DELEGATION)
    }

    fn process(&self, op: &TraceOperation) -> Result<(), DecodeError> {
        let Some(row) = staking::delegation(&self.chain_name, op)? else {
            return Ok(());
        };
        let key = row.natural_key();
        if row.delete_height.is_some() {
            self.inserts.remove(&key);
            self.deletes.put(key, row);
        } else {
            self.deletes.remove(&key);
            self.inserts.put(key, row);
        }
        Ok(())
    }

    fn flush(&self) -> Vec<WritebackOp> {
        let mut ops = Vec::new();

        let mut rows = self.inserts.drain();
        if !rows.is_empty() {
            rows.sort_by(|a, b| a.natural_key().cmp(&b.natural_key()));
            ops.push(WritebackOp {
                kind: WritebackKind::Upsert,
                module: self.name(),
                rows: RowBatch::Delegations(rows),
            });
        }

        // Deletes target one natural key each, so each gets its own op.
        let mut deleted = self.deletes.drain();
        deleted.sort_by(|a, b| a.natural_key().cmp(&b.natural_key()));
        for row in deleted {
            ops.push(WritebackOp {
                kind: WritebackKind::Delete,
                module: self.name(),
                rows: RowBatch::Delegations(vec![row]),
            });
        }

        ops
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::super::test_context;
    use super::*;
    use crate::decoder::proto;
    use crate::trace::Operation;

    fn pair_key(a: &[u8], b: &[u8]) -> Vec<u8> {
        let mut key = vec![keys::prefix::DELEGATION, a.len() as u8];
        key.extend_from_slice(a);
        key.push(b.len() as u8);
        key.extend_from_slice(b);
        key
    }

    fn write_op(a: &[u8], b: &[u8], shares: &str, height: u64) -> TraceOperation {
        TraceOperation {
            operation: Operation::Write,
            key: pair_key(a, b),
            value: proto::Delegation {
                delegator_address: String::new(),
                validator_address: String::new(),
                shares: shares.into(),
            }
            .encode_to_vec(),
            block_height: height,
            tx_hash: String::new(),
            suggested_processor: None,
        }
    }

    fn delete_op(a: &[u8], b: &[u8], height: u64) -> TraceOperation {
        TraceOperation {
            operation: Operation::Delete,
            key: pair_key(a, b),
            value: Vec::new(),
            block_height: height,
            tx_hash: String::new(),
            suggested_processor: None,
        }
    }

    #[test]
    fn write_then_delete_leaves_only_the_delete() {
        let p = DelegationsProcessor::new(&test_context());
        p.process(&write_op(&[0x0D; 20], &[0x0E; 20], "1000000000000000000", 5))
            .unwrap();
        p.process(&delete_op(&[0x0D; 20], &[0x0E; 20], 5)).unwrap();

        let ops = p.flush();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, WritebackKind::Delete);
        assert_eq!(ops[0].rows.len(), 1);
    }

    #[test]
    fn delete_then_write_leaves_only_the_upsert() {
        let p = DelegationsProcessor::new(&test_context());
        p.process(&delete_op(&[0x0D; 20], &[0x0E; 20], 5)).unwrap();
        p.process(&write_op(&[0x0D; 20], &[0x0E; 20], "1000000000000000000", 5))
            .unwrap();

        let ops = p.flush();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, WritebackKind::Upsert);
    }

    #[test]
    fn each_deleted_pair_gets_its_own_writeback() {
        let p = DelegationsProcessor::new(&test_context());
        p.process(&delete_op(&[0x0D; 20], &[0x0E; 20], 5)).unwrap();
        p.process(&delete_op(&[0x0D; 20], &[0x0F; 20], 5)).unwrap();

        let ops = p.flush();
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.kind == WritebackKind::Delete));
        assert!(ops.iter().all(|op| op.rows.len() == 1));
    }
}
