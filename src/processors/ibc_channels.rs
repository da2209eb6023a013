//! IBC channel module processor

use super::cache::RowCache;
use super::{ModuleProcessor, ProcessorContext, RowBatch, WritebackKind, WritebackOp};
use crate::decoder::{ibc, keys};
use crate::error::DecodeError;
use crate::models::IbcChannelRow;
use crate::trace::TraceOperation;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS ibc_channels (
        id BIGSERIAL PRIMARY KEY,
        chain_name TEXT NOT NULL,
        port_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        state INT NOT NULL,
        counterparty_port_id TEXT NOT NULL,
        counterparty_channel_id TEXT NOT NULL,
        hops TEXT NOT NULL,
        height BIGINT NOT NULL,
        UNIQUE (chain_name, port_id, channel_id)
    )"#,
];

pub struct IbcChannelsProcessor {
    chain_name: String,
    inserts: RowCache<(String, String), IbcChannelRow>,
}

impl IbcChannelsProcessor {
    pub fn new(ctx: &ProcessorContext) -> Self {
        Self {
            chain_name: ctx.chain_name.clone(),
            inserts: RowCache::new(),
        }
    }
}

impl ModuleProcessor for IbcChannelsProcessor {
    fn name(&self) -> &'static str {
        "ibc-channels"
    }

    fn owns_key(&self, key: &[u8]) -> bool {
        key.starts_with(keys::IBC_CHANNEL_KEY_PREFIX)
    }

    fn process(&self, op: &TraceOperation) -> Result<(), DecodeError> {
        if let Some(row) = ibc::channel(&self.chain_name, op)? {
            self.inserts
                .put((row.port_id.clone(), row.channel_id.clone()), row);
        }
        Ok(())
    }

    fn flush(&self) -> Vec<WritebackOp> {
        let mut rows = self.inserts.drain();
        if rows.is_empty() {
            return Vec::new();
        }
        rows.sort_by(|a, b| (&a.port_id, &a.channel_id).cmp(&(&b.port_id, &b.channel_id)));
        vec![WritebackOp {
            kind: WritebackKind::Upsert,
            module: self.name(),
            rows: RowBatch::IbcChannels(rows),
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
    fn owns_channel_end_paths() {
        let p = IbcChannelsProcessor::new(&test_context());
        assert!(p.owns_key(b"channelEnds/ports/transfer/channels/channel-0"));
        assert!(!p.owns_key(b"nextSequenceSend/ports/transfer/channels/channel-0"));
        assert!(!p.owns_key(b"connections/connection-0"));
    }
}
