//! Auth account module processor

use super::cache::RowCache;
use super::{ModuleProcessor, ProcessorContext, RowBatch, WritebackKind, WritebackOp};
use crate::decoder::{auth, keys};
use crate::error::DecodeError;
use crate::models::AuthAccountRow;
use crate::trace::TraceOperation;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS auth_accounts (
        id BIGSERIAL PRIMARY KEY,
        chain_name TEXT NOT NULL,
        address TEXT NOT NULL,
        account_number BIGINT NOT NULL,
        sequence_number BIGINT NOT NULL,
        height BIGINT NOT NULL,
        UNIQUE (chain_name, address)
    )"#,
];

/// Tracks account numbers and sequences from the account keyspace.
pub struct AuthProcessor {
    chain_name: String,
    inserts: RowCache<String, AuthAccountRow>,
}

impl AuthProcessor {
    pub fn new(ctx: &ProcessorContext) -> Self {
        Self {
            chain_name: ctx.chain_name.clone(),
            inserts: RowCache::new(),
        }
    }
}

impl ModuleProcessor for AuthProcessor {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn owns_key(&self, key: &[u8]) -> bool {
        keys::looks_like_address_key(key, keys::prefix::AUTH_ACCOUNT)
    }

    fn process(&self, op: &TraceOperation) -> Result<(), DecodeError> {
        if let Some(row) = auth::account(&self.chain_name, op)? {
            self.inserts.put(row.address.clone(), row);
        }
        Ok(())
    }

    fn flush(&self) -> Vec<WritebackOp> {
        let mut rows = self.inserts.drain();
        if rows.is_empty() {
            return Vec::new();
        }
        rows.sort_by(|a, b| a.address.cmp(&b.address));
        vec![WritebackOp {
            kind: WritebackKind::Upsert,
            module: self.name(),
            rows: RowBatch::AuthAccounts(rows),
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
    use crate::decoder::proto::{BaseAccount, BASE_ACCOUNT_TYPE_URL};
    use crate::trace::Operation;

    fn account_op(addr: &[u8], sequence: u64, height: u64) -> TraceOperation {
        let mut key = vec![keys::prefix::AUTH_ACCOUNT, addr.len() as u8];
        key.extend_from_slice(addr);
        let any = prost_types::Any {
            type_url: BASE_ACCOUNT_TYPE_URL.into(),
            value: BaseAccount {
                address: String::new(),
                pub_key: None,
                account_number: 7,
                sequence,
            }
            .encode_to_vec(),
        };
        TraceOperation {
            operation: Operation::Write,
            key,
            value: any.encode_to_vec(),
            block_height: height,
            tx_hash: String::new(),
            suggested_processor: None,
        }
    }

    #[test]
    fn owns_exact_address_keys() {
        let p = AuthProcessor::new(&test_context());
        assert!(p.owns_key(&account_op(&[0x01; 20], 1, 1).key));
        assert!(p.owns_key(&account_op(&[0x01; 32], 1, 1).key));

        // Bank keys share the layout but not the prefix byte.
        let mut bank_key = vec![keys::prefix::BANK_BALANCE, 20];
        bank_key.extend_from_slice(&[0x01; 20]);
        assert!(!p.owns_key(&bank_key));
    }

    #[test]
    fn coalesces_sequence_bumps() {
        let p = AuthProcessor::new(&test_context());
        p.process(&account_op(&[0x01; 20], 4, 5)).unwrap();
        p.process(&account_op(&[0x01; 20], 5, 5)).unwrap();
        let ops = p.flush();
        assert_eq!(ops.len(), 1);
        let RowBatch::AuthAccounts(rows) = &ops[0].rows else {
            panic!("wrong batch type");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sequence_number, 5);
    }
}
