//! IBC client module processor

use super::cache::RowCache;
use super::{ModuleProcessor, ProcessorContext, RowBatch, WritebackKind, WritebackOp};
use crate::decoder::{ibc, keys};
use crate::error::DecodeError;
use crate::models::IbcClientRow;
use crate::trace::TraceOperation;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS ibc_clients (
        id BIGSERIAL PRIMARY KEY,
        chain_name TEXT NOT NULL,
        client_id TEXT NOT NULL,
        counterparty_chain_id TEXT NOT NULL,
        latest_height BIGINT NOT NULL,
        trusting_period_ns BIGINT NOT NULL,
        height BIGINT NOT NULL,
        UNIQUE (chain_name, client_id)
    )"#,
];

pub struct IbcClientsProcessor {
    chain_name: String,
    inserts: RowCache<String, IbcClientRow>,
}

impl IbcClientsProcessor {
    pub fn new(ctx: &ProcessorContext) -> Self {
        Self {
            chain_name: ctx.chain_name.clone(),
            inserts: RowCache::new(),
        }
    }
}

impl ModuleProcessor for IbcClientsProcessor {
    fn name(&self) -> &'static str {
        "ibc-clients"
    }

    fn owns_key(&self, key: &[u8]) -> bool {
        key.starts_with(keys::IBC_CLIENT_KEY_PREFIX) && key.ends_with(keys::IBC_CLIENT_KEY_SUFFIX)
    }

    fn process(&self, op: &TraceOperation) -> Result<(), DecodeError> {
        if let Some(row) = ibc::client_state(&self.chain_name, op)? {
            self.inserts.put(row.client_id.clone(), row);
        }
        Ok(())
    }

    fn flush(&self) -> Vec<WritebackOp> {
        let mut rows = self.inserts.drain();
        if rows.is_empty() {
            return Vec::new();
        }
        rows.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        vec![WritebackOp {
            kind: WritebackKind::Upsert,
            module: self.name(),
            rows: RowBatch::IbcClients(rows),
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
    fn owns_client_state_paths_only() {
        let p = IbcClientsProcessor::new(&test_context());
        assert!(p.owns_key(b"clients/07-tendermint-0/clientState"));
        // Consensus states live under the same root but a different leaf.
        assert!(!p.owns_key(b"clients/07-tendermint-0/consensusStates/1-100"));
        assert!(!p.owns_key(b"connections/connection-0"));
    }
}
