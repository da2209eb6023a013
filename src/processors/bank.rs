//! Balance module processor

use std::sync::Arc;

use super::cache::RowCache;
use super::{ModuleProcessor, ProcessorContext, RowBatch, WritebackKind, WritebackOp};
use crate::decoder::{bank, keys, ChainCodec};
use crate::error::DecodeError;
use crate::models::BalanceRow;
use crate::trace::TraceOperation;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS balances (
        id BIGSERIAL PRIMARY KEY,
        chain_name TEXT NOT NULL,
        address TEXT NOT NULL,
        denom TEXT NOT NULL,
        amount TEXT NOT NULL,
        height BIGINT NOT NULL,
        UNIQUE (chain_name, address, denom)
    )"#,
    "CREATE INDEX IF NOT EXISTS balances_address_idx ON balances (address)",
];

/// Tracks per-account, per-denom balances from the bank keyspace.
pub struct BankProcessor {
    chain_name: String,
    codec: Arc<dyn ChainCodec>,
    inserts: RowCache<(String, String), BalanceRow>,
}

impl BankProcessor {
    pub fn new(ctx: &ProcessorContext) -> Self {
        Self {
            chain_name: ctx.chain_name.clone(),
            codec: ctx.codec.clone(),
            inserts: RowCache::new(),
        }
    }
}

impl ModuleProcessor for BankProcessor {
    fn name(&self) -> &'static str {
        "bank"
    }

    fn owns_key(&self, key: &[u8]) -> bool {
        keys::looks_like_balance_key(key)
    }

    fn process(&self, op: &TraceOperation) -> Result<(), DecodeError> {
        if let Some(row) = bank::balance(self.codec.as_ref(), &self.chain_name, op)? {
            self.inserts.put(row.natural_key(), row);
        }
        Ok(())
    }

    fn flush(&self) -> Vec<WritebackOp> {
        let mut rows = self.inserts.drain();
        if rows.is_empty() {
            return Vec::new();
        }
        rows.sort_by(|a, b| a.natural_key().cmp(&b.natural_key()));
        vec![WritebackOp {
            kind: WritebackKind::Upsert,
            module: self.name(),
            rows: RowBatch::Balances(rows),
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
    use crate::trace::Operation;

    fn balance_op(addr: &[u8], denom: &str, amount: &str, height: u64) -> TraceOperation {
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

    #[test]
    fn owns_balance_keys_only() {
        let p = BankProcessor::new(&test_context());
        assert!(p.owns_key(&balance_op(&[0xAA; 20], "stake", "1", 1).key));
        assert!(!p.owns_key(&[keys::prefix::AUTH_ACCOUNT, 20]));
        assert!(!p.owns_key(b"clients/07-tendermint-0/clientState"));
    }

    #[test]
    fn last_write_wins_within_a_flush_interval() {
        let p = BankProcessor::new(&test_context());
        p.process(&balance_op(&[0xAA; 20], "stake", "100", 5)).unwrap();
        p.process(&balance_op(&[0xAA; 20], "stake", "250", 5)).unwrap();

        let ops = p.flush();
        assert_eq!(ops.len(), 1);
        let RowBatch::Balances(rows) = &ops[0].rows else {
            panic!("wrong batch type");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, "250");
        assert_eq!(rows[0].height, 5);

        // Flush resets the cache.
        assert!(p.flush().is_empty());
    }

    #[test]
    fn distinct_denoms_keep_distinct_entries() {
        let p = BankProcessor::new(&test_context());
        p.process(&balance_op(&[0xAA; 20], "stake", "1", 5)).unwrap();
        p.process(&balance_op(&[0xAA; 20], "uatom", "2", 5)).unwrap();
        let ops = p.flush();
        assert_eq!(ops[0].rows.len(), 2);
    }
}
