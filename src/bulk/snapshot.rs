//! Read-only snapshot of the full key space
//!
//! The snapshot is a RocksDB database with one column family per module
//! keyspace plus a metadata family carrying the latest committed height.
//! The importer only ever opens it read-only.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{DBWithThreadMode, IteratorMode, MultiThreaded, Options};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ImportError;

pub type SnapshotDb = DBWithThreadMode<MultiThreaded>;

/// Column family names, one per module keyspace.
pub struct Keyspaces;

impl Keyspaces {
    pub const BANK: &'static str = "bank";
    pub const AUTH: &'static str = "acc";
    pub const STAKING: &'static str = "staking";
    pub const IBC: &'static str = "ibc";
    pub const TRANSFER: &'static str = "transfer";
    pub const WASM: &'static str = "wasm";
    pub const METADATA: &'static str = "metadata";

    pub fn all() -> Vec<&'static str> {
        vec![
            Self::BANK,
            Self::AUTH,
            Self::STAKING,
            Self::IBC,
            Self::TRANSFER,
            Self::WASM,
            Self::METADATA,
        ]
    }

    /// The keyspace a module's worker scans. Several modules share one
    /// keyspace; their key predicates keep them apart.
    pub fn for_module(module: &str) -> Option<&'static str> {
        match module {
            "bank" => Some(Self::BANK),
            "auth" => Some(Self::AUTH),
            "delegations" | "unbonding-delegations" | "validators" => Some(Self::STAKING),
            "ibc-clients" | "ibc-connections" | "ibc-channels" => Some(Self::IBC),
            "denom-traces" => Some(Self::TRANSFER),
            "cw20-balances" | "cw20-token-info" => Some(Self::WASM),
            _ => None,
        }
    }
}

pub const LATEST_HEIGHT_KEY: &[u8] = b"latest_height";

/// Metadata record stored under [`LATEST_HEIGHT_KEY`], bincode-encoded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub height: u64,
}

pub struct SnapshotStore {
    db: SnapshotDb,
}

impl SnapshotStore {
    /// Open the snapshot read-only at `path`.
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        info!(path = %path.display(), "opening snapshot store");
        let opts = Options::default();
        let db = SnapshotDb::open_cf_for_read_only(&opts, path, Keyspaces::all(), false)?;
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<Arc<rocksdb::BoundColumnFamily<'_>>, ImportError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ImportError::Metadata(format!("keyspace {name:?} not found in snapshot")))
    }

    /// The height the snapshot was committed at.
    pub fn latest_height(&self) -> Result<u64, ImportError> {
        let cf = self.cf(Keyspaces::METADATA)?;
        let raw = self
            .db
            .get_cf(&cf, LATEST_HEIGHT_KEY)?
            .ok_or_else(|| ImportError::Metadata("latest height record missing".to_string()))?;
        let meta: SnapshotMeta =
            bincode::deserialize(&raw).map_err(|e| ImportError::Metadata(e.to_string()))?;
        Ok(meta.height)
    }

    /// Iterate every key/value pair in one keyspace, in key order.
    pub fn scan(
        &self,
        keyspace: &str,
    ) -> Result<
        impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>> + '_,
        ImportError,
    > {
        let cf = self.cf(keyspace)?;
        Ok(self.db.iterator_cf(&cf, IteratorMode::Start))
    }
}
