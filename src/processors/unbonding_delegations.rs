//! Unbonding-delegation module processor
//!
//! Owns both the primary unbonding keyspace and the by-validator secondary
//! index; operations against the index decode to nothing, so only primary
//! records ever reach the caches.

use super::cache::RowCache;
use super::{ModuleProcessor, ProcessorContext, RowBatch, WritebackKind, WritebackOp};
use crate::decoder::{keys, staking};
use crate::error::DecodeError;
use crate::models::UnbondingDelegationRow;
use crate::trace::TraceOperation;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS unbonding_delegations (
        id BIGSERIAL PRIMARY KEY,
        chain_name TEXT NOT NULL,
        delegator_address TEXT NOT NULL,
        validator_address TEXT NOT NULL,
        entries JSONB NOT NULL,
        height BIGINT NOT NULL,
        UNIQUE (chain_name, delegator_address, validator_address)
    )"#,
];

pub struct UnbondingDelegationsProcessor {
    chain_name: String,
    inserts: RowCache<(String, String), UnbondingDelegationRow>,
    deletes: RowCache<(String, String), UnbondingDelegationRow>,
}

impl UnbondingDelegationsProcessor {
    pub fn new(ctx: &ProcessorContext) -> Self {
        Self {
            chain_name: ctx.chain_name.clone(),
            inserts: RowCache::new(),
            deletes: RowCache::new(),
        }
    }
}

impl ModuleProcessor for UnbondingDelegationsProcessor {
    fn name(&self) -> &'static str {
        "unbonding-delegations"
    }

    fn owns_key(&self, key: &[u8]) -> bool {
        keys::looks_like_pair_key(key, keys::prefix::UNBONDING_DELEGATION)
            || keys::looks_like_pair_key(key, keys::prefix::UNBONDING_BY_VALIDATOR)
    }

    fn process(&self, op: &TraceOperation) -> Result<(), DecodeError> {
        let Some(row) = staking::unbonding_delegation(&self.chain_name, op)? else {
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
                rows: RowBatch::UnbondingDelegations(rows),
            });
        }

        let mut deleted = self.deletes.drain();
        deleted.sort_by(|a, b| a.natural_key().cmp(&b.natural_key()));
        for row in deleted {
            ops.push(WritebackOp {
                kind: WritebackKind::Delete,
                module: self.name(),
                rows: RowBatch::UnbondingDelegations(vec![row]),
            });
        }

        ops
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }
}
