//! Validator module processor

use super::cache::RowCache;
use super::{ModuleProcessor, ProcessorContext, RowBatch, WritebackKind, WritebackOp};
use crate::decoder::{keys, staking};
use crate::error::DecodeError;
use crate::models::ValidatorRow;
use crate::trace::TraceOperation;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS validators (
        id BIGSERIAL PRIMARY KEY,
        chain_name TEXT NOT NULL,
        operator_address TEXT NOT NULL,
        jailed BOOLEAN NOT NULL,
        status INT NOT NULL,
        tokens TEXT NOT NULL,
        delegator_shares NUMERIC NOT NULL,
        height BIGINT NOT NULL,
        UNIQUE (chain_name, operator_address)
    )"#,
];

/// Tracks validator records keyed by operator address. Validators are
/// never deleted from the store; they transition through bond statuses.
pub struct ValidatorsProcessor {
    chain_name: String,
    inserts: RowCache<String, ValidatorRow>,
}

impl ValidatorsProcessor {
    pub fn new(ctx: &ProcessorContext) -> Self {
        Self {
            chain_name: ctx.chain_name.clone(),
            inserts: RowCache::new(),
        }
    }
}

impl ModuleProcessor for ValidatorsProcessor {
    fn name(&self) -> &'static str {
        "validators"
    }

    fn owns_key(&self, key: &[u8]) -> bool {
        keys::looks_like_address_key(key, keys::prefix::VALIDATOR)
    }

    fn process(&self, op: &TraceOperation) -> Result<(), DecodeError> {
        if let Some(row) = staking::validator(&self.chain_name, op)? {
            self.inserts.put(row.operator_address.clone(), row);
        }
        Ok(())
    }

    fn flush(&self) -> Vec<WritebackOp> {
        let mut rows = self.inserts.drain();
        if rows.is_empty() {
            return Vec::new();
        }
        rows.sort_by(|a, b| a.operator_address.cmp(&b.operator_address));
        vec![WritebackOp {
            kind: WritebackKind::Upsert,
            module: self.name(),
            rows: RowBatch::Validators(rows),
        }]
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

    fn validator_op(addr: &[u8], jailed: bool, height: u64) -> TraceOperation {
        let mut key = vec![keys::prefix::VALIDATOR, addr.len() as u8];
        key.extend_from_slice(addr);
        TraceOperation {
            operation: Operation::Write,
            key,
            value: proto::Validator {
                jailed,
                status: 3,
                tokens: "1000".into(),
                delegator_shares: "1000000000000000000000".into(),
                ..Default::default()
            }
            .encode_to_vec(),
            block_height: height,
            tx_hash: String::new(),
            suggested_processor: None,
        }
    }

    #[test]
    fn owns_validator_keys() {
        let p = ValidatorsProcessor::new(&test_context());
        assert!(p.owns_key(&validator_op(&[0x0E; 20], false, 1).key));
        let mut delegation_key = vec![keys::prefix::DELEGATION, 20];
        delegation_key.extend_from_slice(&[0x0E; 20]);
        assert!(!p.owns_key(&delegation_key));
    }

    #[test]
    fn jail_flip_coalesces_to_latest() {
        let p = ValidatorsProcessor::new(&test_context());
        p.process(&validator_op(&[0x0E; 20], false, 5)).unwrap();
        p.process(&validator_op(&[0x0E; 20], true, 5)).unwrap();
        let ops = p.flush();
        let RowBatch::Validators(rows) = &ops[0].rows else {
            panic!("wrong batch type");
        };
        assert_eq!(rows.len(), 1);
        assert!(rows[0].jailed);
    }
}
