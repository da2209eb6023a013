//! Contract-token metadata module processor

use super::cache::RowCache;
use super::{ModuleProcessor, ProcessorContext, RowBatch, WritebackKind, WritebackOp};
use crate::decoder::wasm;
use crate::error::DecodeError;
use crate::models::Cw20TokenInfoRow;
use crate::trace::TraceOperation;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS cw20_token_infos (
        id BIGSERIAL PRIMARY KEY,
        chain_name TEXT NOT NULL,
        contract_address TEXT NOT NULL,
        name TEXT NOT NULL,
        symbol TEXT NOT NULL,
        decimals INT NOT NULL,
        total_supply TEXT NOT NULL,
        height BIGINT NOT NULL,
        UNIQUE (chain_name, contract_address)
    )"#,
];

/// Tracks token metadata kept under each contract's token-info item.
pub struct Cw20TokenInfoProcessor {
    chain_name: String,
    inserts: RowCache<String, Cw20TokenInfoRow>,
}

impl Cw20TokenInfoProcessor {
    pub fn new(ctx: &ProcessorContext) -> Self {
        Self {
            chain_name: ctx.chain_name.clone(),
            inserts: RowCache::new(),
        }
    }
}

impl ModuleProcessor for Cw20TokenInfoProcessor {
    fn name(&self) -> &'static str {
        "cw20-token-info"
    }

    fn owns_key(&self, key: &[u8]) -> bool {
        wasm::looks_like_token_info_key(key)
    }

    fn process(&self, op: &TraceOperation) -> Result<(), DecodeError> {
        if let Some(row) = wasm::cw20_token_info(&self.chain_name, op)? {
            self.inserts.put(row.contract_address.clone(), row);
        }
        Ok(())
    }

    fn flush(&self) -> Vec<WritebackOp> {
        let mut rows = self.inserts.drain();
        if rows.is_empty() {
            return Vec::new();
        }
        rows.sort_by(|a, b| a.contract_address.cmp(&b.contract_address));
        vec![WritebackOp {
            kind: WritebackKind::Upsert,
            module: self.name(),
            rows: RowBatch::Cw20TokenInfos(rows),
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
    use crate::decoder::keys::prefix;
    use crate::trace::Operation;

    #[test]
    fn processes_token_info_writes() {
        let p = Cw20TokenInfoProcessor::new(&test_context());
        let mut key = vec![prefix::CONTRACT_STORE];
        key.extend_from_slice(&[0xC0; 32]);
        key.extend_from_slice(b"token_info");
        assert!(p.owns_key(&key));

        let op = TraceOperation {
            operation: Operation::Write,
            key,
            value: br#"{"name":"Token","symbol":"TKN","decimals":6,"total_supply":"42"}"#.to_vec(),
            block_height: 2,
            tx_hash: String::new(),
            suggested_processor: None,
        };
        p.process(&op).unwrap();
        let ops = p.flush();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].rows.len(), 1);
    }
}
