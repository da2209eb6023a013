//! Contract-token balance module processor

use super::cache::RowCache;
use super::{ModuleProcessor, ProcessorContext, RowBatch, WritebackKind, WritebackOp};
use crate::decoder::wasm;
use crate::error::DecodeError;
use crate::models::Cw20BalanceRow;
use crate::trace::TraceOperation;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS cw20_balances (
        id BIGSERIAL PRIMARY KEY,
        chain_name TEXT NOT NULL,
        contract_address TEXT NOT NULL,
        address TEXT NOT NULL,
        amount TEXT NOT NULL,
        height BIGINT NOT NULL,
        UNIQUE (chain_name, contract_address, address)
    )"#,
    "CREATE INDEX IF NOT EXISTS cw20_balances_address_idx ON cw20_balances (address)",
];

/// Tracks holder balances kept in token contracts' state maps.
pub struct Cw20BalancesProcessor {
    chain_name: String,
    inserts: RowCache<(String, String), Cw20BalanceRow>,
}

impl Cw20BalancesProcessor {
    pub fn new(ctx: &ProcessorContext) -> Self {
        Self {
            chain_name: ctx.chain_name.clone(),
            inserts: RowCache::new(),
        }
    }
}

impl ModuleProcessor for Cw20BalancesProcessor {
    fn name(&self) -> &'static str {
        "cw20-balances"
    }

    fn owns_key(&self, key: &[u8]) -> bool {
        wasm::looks_like_balance_key(key)
    }

    fn process(&self, op: &TraceOperation) -> Result<(), DecodeError> {
        if let Some(row) = wasm::cw20_balance(&self.chain_name, op)? {
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
            rows: RowBatch::Cw20Balances(rows),
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

    fn balance_op(contract: &[u8; 32], holder: &str, amount: &str, height: u64) -> TraceOperation {
        let mut key = vec![prefix::CONTRACT_STORE];
        key.extend_from_slice(contract);
        key.extend_from_slice(&7u16.to_be_bytes());
        key.extend_from_slice(b"balance");
        key.extend_from_slice(holder.as_bytes());
        TraceOperation {
            operation: Operation::Write,
            key,
            value: format!("\"{amount}\"").into_bytes(),
            block_height: height,
            tx_hash: String::new(),
            suggested_processor: None,
        }
    }

    #[test]
    fn coalesces_per_contract_and_holder() {
        let p = Cw20BalancesProcessor::new(&test_context());
        p.process(&balance_op(&[0xC0; 32], "wasm1a", "10", 5)).unwrap();
        p.process(&balance_op(&[0xC0; 32], "wasm1a", "20", 5)).unwrap();
        p.process(&balance_op(&[0xC1; 32], "wasm1a", "30", 5)).unwrap();

        let ops = p.flush();
        assert_eq!(ops.len(), 1);
        let RowBatch::Cw20Balances(rows) = &ops[0].rows else {
            panic!("wrong batch type");
        };
        assert_eq!(rows.len(), 2);
    }
}
