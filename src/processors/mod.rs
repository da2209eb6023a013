//! Module processors: per-entity key ownership, caching and flushing
//!
//! One processor per domain entity type. A processor owns the key-prefix
//! predicate for its keyspace, an insert cache keyed by natural key (and a
//! delete cache where the entity supports logical deletion), and the calls
//! into the decoders. Caches coalesce repeated writes within one flush
//! interval: last write for a given natural key wins.

mod auth;
mod bank;
mod cache;
mod cw20_balances;
mod cw20_token_info;
mod delegations;
mod denom_traces;
mod ibc_channels;
mod ibc_clients;
mod ibc_connections;
mod unbonding_delegations;
mod validators;

pub use auth::AuthProcessor;
pub use bank::BankProcessor;
pub use cw20_balances::Cw20BalancesProcessor;
pub use cw20_token_info::Cw20TokenInfoProcessor;
pub use delegations::DelegationsProcessor;
pub use denom_traces::DenomTracesProcessor;
pub use ibc_channels::IbcChannelsProcessor;
pub use ibc_clients::IbcClientsProcessor;
pub use ibc_connections::IbcConnectionsProcessor;
pub use unbonding_delegations::UnbondingDelegationsProcessor;
pub use validators::ValidatorsProcessor;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;

use crate::decoder::ChainCodec;
use crate::error::DecodeError;
use crate::models::*;
use crate::trace::TraceOperation;

/// Persistence intent attached to a batch of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritebackKind {
    Upsert,
    Delete,
}

/// A typed batch of rows from exactly one module.
#[derive(Debug, Clone)]
pub enum RowBatch {
    Balances(Vec<BalanceRow>),
    AuthAccounts(Vec<AuthAccountRow>),
    Delegations(Vec<DelegationRow>),
    UnbondingDelegations(Vec<UnbondingDelegationRow>),
    Validators(Vec<ValidatorRow>),
    IbcClients(Vec<IbcClientRow>),
    IbcConnections(Vec<IbcConnectionRow>),
    IbcChannels(Vec<IbcChannelRow>),
    DenomTraces(Vec<DenomTraceRow>),
    Cw20Balances(Vec<Cw20BalanceRow>),
    Cw20TokenInfos(Vec<Cw20TokenInfoRow>),
}

impl RowBatch {
    pub fn len(&self) -> usize {
        match self {
            RowBatch::Balances(v) => v.len(),
            RowBatch::AuthAccounts(v) => v.len(),
            RowBatch::Delegations(v) => v.len(),
            RowBatch::UnbondingDelegations(v) => v.len(),
            RowBatch::Validators(v) => v.len(),
            RowBatch::IbcClients(v) => v.len(),
            RowBatch::IbcConnections(v) => v.len(),
            RowBatch::IbcChannels(v) => v.len(),
            RowBatch::DenomTraces(v) => v.len(),
            RowBatch::Cw20Balances(v) => v.len(),
            RowBatch::Cw20TokenInfos(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A batch of rows plus the intent to apply to the relational store.
/// Created by `flush`, consumed by the database sink, never persisted.
#[derive(Debug, Clone)]
pub struct WritebackOp {
    pub kind: WritebackKind,
    pub module: &'static str,
    pub rows: RowBatch,
}

/// Common contract for one domain entity type's processor.
///
/// `process` and `flush` may be called from different threads: the routing
/// loop drives both in live mode, while bulk-import workers call `process`
/// directly. Implementations guard their caches with their own lock.
pub trait ModuleProcessor: Send + Sync {
    /// Registry name of this module.
    fn name(&self) -> &'static str;

    /// Pure prefix/shape test over the raw store key. No side effects,
    /// cost proportional to the owned prefix.
    fn owns_key(&self, key: &[u8]) -> bool;

    /// Decode one operation and fold it into the cache. "Not applicable"
    /// is silent; an error means malformed or invalid domain data.
    fn process(&self, op: &TraceOperation) -> Result<(), DecodeError>;

    /// Atomically drain the cache(s) into writeback batches. Returns an
    /// empty vec when nothing was pending.
    fn flush(&self) -> Vec<WritebackOp>;

    /// Schema statements this module needs, applied once at startup in
    /// registration order.
    fn migrations(&self) -> &'static [&'static str];
}

/// Decode context shared by every processor.
#[derive(Clone)]
pub struct ProcessorContext {
    pub chain_name: String,
    pub codec: Arc<dyn ChainCodec>,
}

pub type ProcessorFactory = fn(&ProcessorContext) -> Arc<dyn ModuleProcessor>;

/// Module names enabled when the configuration does not list any.
pub const DEFAULT_MODULES: &[&str] = &[
    "bank",
    "auth",
    "delegations",
    "unbonding-delegations",
    "validators",
    "ibc-clients",
    "ibc-connections",
    "ibc-channels",
    "denom-traces",
    "cw20-balances",
    "cw20-token-info",
];

/// The full set of known module constructors.
pub fn registry() -> HashMap<&'static str, ProcessorFactory> {
    let mut map: HashMap<&'static str, ProcessorFactory> = HashMap::new();
    map.insert("bank", |ctx| Arc::new(BankProcessor::new(ctx)));
    map.insert("auth", |ctx| Arc::new(AuthProcessor::new(ctx)));
    map.insert("delegations", |ctx| Arc::new(DelegationsProcessor::new(ctx)));
    map.insert("unbonding-delegations", |ctx| {
        Arc::new(UnbondingDelegationsProcessor::new(ctx))
    });
    map.insert("validators", |ctx| Arc::new(ValidatorsProcessor::new(ctx)));
    map.insert("ibc-clients", |ctx| Arc::new(IbcClientsProcessor::new(ctx)));
    map.insert("ibc-connections", |ctx| {
        Arc::new(IbcConnectionsProcessor::new(ctx))
    });
    map.insert("ibc-channels", |ctx| Arc::new(IbcChannelsProcessor::new(ctx)));
    map.insert("denom-traces", |ctx| Arc::new(DenomTracesProcessor::new(ctx)));
    map.insert("cw20-balances", |ctx| Arc::new(Cw20BalancesProcessor::new(ctx)));
    map.insert("cw20-token-info", |ctx| {
        Arc::new(Cw20TokenInfoProcessor::new(ctx))
    });
    map
}

/// Build processors for the configured module names, in the given order.
/// Unknown names are a startup error; an empty list means the default set.
pub fn build_processors(
    names: &[String],
    ctx: &ProcessorContext,
) -> anyhow::Result<Vec<Arc<dyn ModuleProcessor>>> {
    let registry = registry();
    let selected: Vec<&str> = if names.is_empty() {
        DEFAULT_MODULES.to_vec()
    } else {
        names.iter().map(String::as_str).collect()
    };

    let mut processors = Vec::with_capacity(selected.len());
    for name in selected {
        let Some(factory) = registry.get(name) else {
            let mut known: Vec<_> = registry.keys().copied().collect();
            known.sort_unstable();
            bail!("unknown module {name:?}, known modules: {}", known.join(", "));
        };
        processors.push(factory(ctx));
    }
    Ok(processors)
}

#[cfg(test)]
pub(crate) fn test_context() -> ProcessorContext {
    ProcessorContext {
        chain_name: "testchain".to_string(),
        codec: Arc::new(crate::decoder::CompactCodec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_modules_all_resolve() {
        let ctx = test_context();
        let processors = build_processors(&[], &ctx).unwrap();
        assert_eq!(processors.len(), DEFAULT_MODULES.len());
        for (processor, name) in processors.iter().zip(DEFAULT_MODULES) {
            assert_eq!(processor.name(), *name);
        }
    }

    #[test]
    fn configured_subset_preserves_order() {
        let ctx = test_context();
        let names = vec!["validators".to_string(), "bank".to_string()];
        let processors = build_processors(&names, &ctx).unwrap();
        assert_eq!(processors.len(), 2);
        assert_eq!(processors[0].name(), "validators");
        assert_eq!(processors[1].name(), "bank");
    }

    #[test]
    fn unknown_module_is_a_startup_error() {
        let ctx = test_context();
        let names = vec!["bank".to_string(), "lottery".to_string()];
        let err = build_processors(&names, &ctx).err().unwrap();
        assert!(err.to_string().contains("lottery"));
    }

    #[test]
    fn every_module_exposes_migrations() {
        let ctx = test_context();
        for processor in build_processors(&[], &ctx).unwrap() {
            assert!(
                !processor.migrations().is_empty(),
                "{} has no migrations",
                processor.name()
            );
        }
    }
}
