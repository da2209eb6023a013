//! IBC connection module processor

use super::cache::RowCache;
use super::{ModuleProcessor, ProcessorContext, RowBatch, WritebackKind, WritebackOp};
use crate::decoder::{ibc, keys};
use crate::error::DecodeError;
use crate::models::IbcConnectionRow;
use crate::trace::TraceOperation;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS ibc_connections (
        id BIGSERIAL PRIMARY KEY,
        chain_name TEXT NOT NULL,
        connection_id TEXT NOT NULL,
        client_id TEXT NOT NULL,
        state INT NOT NULL,
        counterparty_client_id TEXT NOT NULL,
        counterparty_connection_id TEXT NOT NULL,
        height BIGINT NOT NULL,
        UNIQUE (chain_name, connection_id)
    )"#,
];

pub struct IbcConnectionsProcessor {
    chain_name: String,
    inserts: RowCache<String, IbcConnectionRow>,
}

impl IbcConnectionsProcessor {
    pub fn new(ctx: &ProcessorContext) -> Self {
        Self {
            chain_name: ctx.chain_name.clone(),
            inserts: RowCache::new(),
        }
    }
}

impl ModuleProcessor for IbcConnectionsProcessor {
    fn name(&self) -> &'static str {
        "ibc-connections"
    }

    fn owns_key(&self, key: &[u8]) -> bool {
        // `connections/<id>` only; deeper paths belong to other records.
        key.starts_with(keys::IBC_CONNECTION_KEY_PREFIX)
            && !key[keys::IBC_CONNECTION_KEY_PREFIX.len()..].contains(&b'/')
    }

    fn process(&self, op: &TraceOperation) -> Result<(), DecodeError> {
        if let Some(row) = ibc::connection(&self.chain_name, op)? {
            self.inserts.put(row.connection_id.clone(), row);
        }
        Ok(())
    }

    fn flush(&self) -> Vec<WritebackOp> {
        let mut rows = self.inserts.drain();
        if rows.is_empty() {
            return Vec::new();
        }
        rows.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        vec![WritebackOp {
            kind: WritebackKind::Upsert,
            module: self.name(),
            rows: RowBatch::IbcConnections(rows),
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
    fn owns_connection_paths_only() {
        let p = IbcConnectionsProcessor::new(&test_context());
        assert!(p.owns_key(b"connections/connection-0"));
        assert!(!p.owns_key(b"connections/connection-0/versions"));
        assert!(!p.owns_key(b"clients/07-tendermint-0/clientState"));
    }
}
