//! PostgreSQL writeback sink
//!
//! Executes writeback batches with runtime-built statements. Upserts go
//! through `INSERT .. ON CONFLICT (natural key) DO UPDATE` in chunks that
//! respect the driver's placeholder ceiling; deletes target one natural
//! key each. A chunk that fails is logged and skipped, the rest of the
//! flush continues.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::QueryBuilder;
use tracing::{debug, error, info, warn};

use super::chunk::chunk_rows;
use super::WritebackSink;
use crate::config::DatabaseConfig;
use crate::error::SinkError;
use crate::models::*;
use crate::processors::{ModuleProcessor, RowBatch, WritebackKind, WritebackOp};

pub struct PostgresSink {
    pool: PgPool,
    max_placeholders: usize,
}

impl PostgresSink {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.postgres_url)
            .await
            .context("failed to connect to PostgreSQL")?;

        Ok(Self {
            pool,
            max_placeholders: config.max_placeholders,
        })
    }

    /// Apply each module's schema statements, in registration order.
    pub async fn apply_migrations(
        &self,
        processors: &[std::sync::Arc<dyn ModuleProcessor>],
    ) -> Result<()> {
        for processor in processors {
            for statement in processor.migrations() {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("migration failed for module {}", processor.name()))?;
            }
            debug!(module = processor.name(), "migrations applied");
        }
        info!(modules = processors.len(), "schema migrations complete");
        Ok(())
    }

    async fn execute(&self, op: &WritebackOp) -> Result<(), SinkError> {
        match (op.kind, &op.rows) {
            (WritebackKind::Upsert, RowBatch::Balances(rows)) => self.upsert_balances(rows).await,
            (WritebackKind::Upsert, RowBatch::AuthAccounts(rows)) => {
                self.upsert_auth_accounts(rows).await
            }
            (WritebackKind::Upsert, RowBatch::Delegations(rows)) => {
                self.upsert_delegations(rows).await
            }
            (WritebackKind::Delete, RowBatch::Delegations(rows)) => {
                self.delete_delegations(rows).await
            }
            (WritebackKind::Upsert, RowBatch::UnbondingDelegations(rows)) => {
                self.upsert_unbonding_delegations(rows).await
            }
            (WritebackKind::Delete, RowBatch::UnbondingDelegations(rows)) => {
                self.delete_unbonding_delegations(rows).await
            }
            (WritebackKind::Upsert, RowBatch::Validators(rows)) => {
                self.upsert_validators(rows).await
            }
            (WritebackKind::Upsert, RowBatch::IbcClients(rows)) => {
                self.upsert_ibc_clients(rows).await
            }
            (WritebackKind::Upsert, RowBatch::IbcConnections(rows)) => {
                self.upsert_ibc_connections(rows).await
            }
            (WritebackKind::Upsert, RowBatch::IbcChannels(rows)) => {
                self.upsert_ibc_channels(rows).await
            }
            (WritebackKind::Upsert, RowBatch::DenomTraces(rows)) => {
                self.upsert_denom_traces(rows).await
            }
            (WritebackKind::Upsert, RowBatch::Cw20Balances(rows)) => {
                self.upsert_cw20_balances(rows).await
            }
            (WritebackKind::Upsert, RowBatch::Cw20TokenInfos(rows)) => {
                self.upsert_cw20_token_infos(rows).await
            }
            (WritebackKind::Delete, _) => {
                warn!(module = op.module, "delete writeback for a module without delete support");
                Ok(())
            }
        }
    }

    fn check_affected(
        module: &'static str,
        expected: usize,
        affected: u64,
    ) -> Result<(), SinkError> {
        if affected == 0 && expected > 0 {
            return Err(SinkError::NoRowsAffected { module, expected });
        }
        Ok(())
    }

    async fn upsert_balances(&self, rows: &[BalanceRow]) -> Result<(), SinkError> {
        const FIELDS: usize = 5;
        for chunk in chunk_rows(rows, self.max_placeholders, FIELDS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO balances (chain_name, address, denom, amount, height) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.chain_name)
                    .push_bind(&row.address)
                    .push_bind(&row.denom)
                    .push_bind(&row.amount)
                    .push_bind(row.height);
            });
            qb.push(
                " ON CONFLICT (chain_name, address, denom) DO UPDATE SET \
                 amount = EXCLUDED.amount, height = EXCLUDED.height",
            );
            let result = qb.build().execute(&self.pool).await?;
            Self::check_affected("bank", chunk.len(), result.rows_affected())?;
        }
        Ok(())
    }

    async fn upsert_auth_accounts(&self, rows: &[AuthAccountRow]) -> Result<(), SinkError> {
        const FIELDS: usize = 5;
        for chunk in chunk_rows(rows, self.max_placeholders, FIELDS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO auth_accounts (chain_name, address, account_number, sequence_number, height) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.chain_name)
                    .push_bind(&row.address)
                    .push_bind(row.account_number)
                    .push_bind(row.sequence_number)
                    .push_bind(row.height);
            });
            qb.push(
                " ON CONFLICT (chain_name, address) DO UPDATE SET \
                 account_number = EXCLUDED.account_number, \
                 sequence_number = EXCLUDED.sequence_number, \
                 height = EXCLUDED.height",
            );
            let result = qb.build().execute(&self.pool).await?;
            Self::check_affected("auth", chunk.len(), result.rows_affected())?;
        }
        Ok(())
    }

    async fn upsert_delegations(&self, rows: &[DelegationRow]) -> Result<(), SinkError> {
        const FIELDS: usize = 5;
        for chunk in chunk_rows(rows, self.max_placeholders, FIELDS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO delegations (chain_name, delegator_address, validator_address, amount, height) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.chain_name)
                    .push_bind(&row.delegator_address)
                    .push_bind(&row.validator_address)
                    .push_bind(row.amount)
                    .push_bind(row.height);
            });
            qb.push(
                " ON CONFLICT (chain_name, delegator_address, validator_address) DO UPDATE SET \
                 amount = EXCLUDED.amount, height = EXCLUDED.height",
            );
            let result = qb.build().execute(&self.pool).await?;
            Self::check_affected("delegations", chunk.len(), result.rows_affected())?;
        }
        Ok(())
    }

    async fn delete_delegations(&self, rows: &[DelegationRow]) -> Result<(), SinkError> {
        for row in rows {
            let result = sqlx::query(
                "DELETE FROM delegations \
                 WHERE chain_name = $1 AND delegator_address = $2 AND validator_address = $3",
            )
            .bind(&row.chain_name)
            .bind(&row.delegator_address)
            .bind(&row.validator_address)
            .execute(&self.pool)
            .await?;
            // A zero-row delete is idempotent, not an error.
            if result.rows_affected() == 0 {
                debug!(
                    delegator = %row.delegator_address,
                    validator = %row.validator_address,
                    "delete matched no delegation row"
                );
            }
        }
        Ok(())
    }

    async fn upsert_unbonding_delegations(
        &self,
        rows: &[UnbondingDelegationRow],
    ) -> Result<(), SinkError> {
        const FIELDS: usize = 5;
        for chunk in chunk_rows(rows, self.max_placeholders, FIELDS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO unbonding_delegations (chain_name, delegator_address, validator_address, entries, height) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.chain_name)
                    .push_bind(&row.delegator_address)
                    .push_bind(&row.validator_address)
                    .push_bind(&row.entries)
                    .push_bind(row.height);
            });
            qb.push(
                " ON CONFLICT (chain_name, delegator_address, validator_address) DO UPDATE SET \
                 entries = EXCLUDED.entries, height = EXCLUDED.height",
            );
            let result = qb.build().execute(&self.pool).await?;
            Self::check_affected("unbonding-delegations", chunk.len(), result.rows_affected())?;
        }
        Ok(())
    }

    async fn delete_unbonding_delegations(
        &self,
        rows: &[UnbondingDelegationRow],
    ) -> Result<(), SinkError> {
        for row in rows {
            let result = sqlx::query(
                "DELETE FROM unbonding_delegations \
                 WHERE chain_name = $1 AND delegator_address = $2 AND validator_address = $3",
            )
            .bind(&row.chain_name)
            .bind(&row.delegator_address)
            .bind(&row.validator_address)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                debug!(
                    delegator = %row.delegator_address,
                    validator = %row.validator_address,
                    "delete matched no unbonding row"
                );
            }
        }
        Ok(())
    }

    async fn upsert_validators(&self, rows: &[ValidatorRow]) -> Result<(), SinkError> {
        const FIELDS: usize = 7;
        for chunk in chunk_rows(rows, self.max_placeholders, FIELDS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO validators (chain_name, operator_address, jailed, status, tokens, delegator_shares, height) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.chain_name)
                    .push_bind(&row.operator_address)
                    .push_bind(row.jailed)
                    .push_bind(row.status)
                    .push_bind(&row.tokens)
                    .push_bind(row.delegator_shares)
                    .push_bind(row.height);
            });
            qb.push(
                " ON CONFLICT (chain_name, operator_address) DO UPDATE SET \
                 jailed = EXCLUDED.jailed, status = EXCLUDED.status, \
                 tokens = EXCLUDED.tokens, delegator_shares = EXCLUDED.delegator_shares, \
                 height = EXCLUDED.height",
            );
            let result = qb.build().execute(&self.pool).await?;
            Self::check_affected("validators", chunk.len(), result.rows_affected())?;
        }
        Ok(())
    }

    async fn upsert_ibc_clients(&self, rows: &[IbcClientRow]) -> Result<(), SinkError> {
        const FIELDS: usize = 6;
        for chunk in chunk_rows(rows, self.max_placeholders, FIELDS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO ibc_clients (chain_name, client_id, counterparty_chain_id, latest_height, trusting_period_ns, height) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.chain_name)
                    .push_bind(&row.client_id)
                    .push_bind(&row.counterparty_chain_id)
                    .push_bind(row.latest_height)
                    .push_bind(row.trusting_period_ns)
                    .push_bind(row.height);
            });
            qb.push(
                " ON CONFLICT (chain_name, client_id) DO UPDATE SET \
                 counterparty_chain_id = EXCLUDED.counterparty_chain_id, \
                 latest_height = EXCLUDED.latest_height, \
                 trusting_period_ns = EXCLUDED.trusting_period_ns, \
                 height = EXCLUDED.height",
            );
            let result = qb.build().execute(&self.pool).await?;
            Self::check_affected("ibc-clients", chunk.len(), result.rows_affected())?;
        }
        Ok(())
    }

    async fn upsert_ibc_connections(&self, rows: &[IbcConnectionRow]) -> Result<(), SinkError> {
        const FIELDS: usize = 7;
        for chunk in chunk_rows(rows, self.max_placeholders, FIELDS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO ibc_connections (chain_name, connection_id, client_id, state, counterparty_client_id, counterparty_connection_id, height) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.chain_name)
                    .push_bind(&row.connection_id)
                    .push_bind(&row.client_id)
                    .push_bind(row.state)
                    .push_bind(&row.counterparty_client_id)
                    .push_bind(&row.counterparty_connection_id)
                    .push_bind(row.height);
            });
            qb.push(
                " ON CONFLICT (chain_name, connection_id) DO UPDATE SET \
                 client_id = EXCLUDED.client_id, state = EXCLUDED.state, \
                 counterparty_client_id = EXCLUDED.counterparty_client_id, \
                 counterparty_connection_id = EXCLUDED.counterparty_connection_id, \
                 height = EXCLUDED.height",
            );
            let result = qb.build().execute(&self.pool).await?;
            Self::check_affected("ibc-connections", chunk.len(), result.rows_affected())?;
        }
        Ok(())
    }

    async fn upsert_ibc_channels(&self, rows: &[IbcChannelRow]) -> Result<(), SinkError> {
        const FIELDS: usize = 8;
        for chunk in chunk_rows(rows, self.max_placeholders, FIELDS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO ibc_channels (chain_name, port_id, channel_id, state, counterparty_port_id, counterparty_channel_id, hops, height) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.chain_name)
                    .push_bind(&row.port_id)
                    .push_bind(&row.channel_id)
                    .push_bind(row.state)
                    .push_bind(&row.counterparty_port_id)
                    .push_bind(&row.counterparty_channel_id)
                    .push_bind(&row.hops)
                    .push_bind(row.height);
            });
            qb.push(
                " ON CONFLICT (chain_name, port_id, channel_id) DO UPDATE SET \
                 state = EXCLUDED.state, \
                 counterparty_port_id = EXCLUDED.counterparty_port_id, \
                 counterparty_channel_id = EXCLUDED.counterparty_channel_id, \
                 hops = EXCLUDED.hops, height = EXCLUDED.height",
            );
            let result = qb.build().execute(&self.pool).await?;
            Self::check_affected("ibc-channels", chunk.len(), result.rows_affected())?;
        }
        Ok(())
    }

    async fn upsert_denom_traces(&self, rows: &[DenomTraceRow]) -> Result<(), SinkError> {
        const FIELDS: usize = 5;
        for chunk in chunk_rows(rows, self.max_placeholders, FIELDS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO denom_traces (chain_name, hash, path, base_denom, height) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.chain_name)
                    .push_bind(&row.hash)
                    .push_bind(&row.path)
                    .push_bind(&row.base_denom)
                    .push_bind(row.height);
            });
            qb.push(
                " ON CONFLICT (chain_name, hash) DO UPDATE SET \
                 path = EXCLUDED.path, base_denom = EXCLUDED.base_denom, \
                 height = EXCLUDED.height",
            );
            let result = qb.build().execute(&self.pool).await?;
            Self::check_affected("denom-traces", chunk.len(), result.rows_affected())?;
        }
        Ok(())
    }

    async fn upsert_cw20_balances(&self, rows: &[Cw20BalanceRow]) -> Result<(), SinkError> {
        const FIELDS: usize = 5;
        for chunk in chunk_rows(rows, self.max_placeholders, FIELDS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO cw20_balances (chain_name, contract_address, address, amount, height) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.chain_name)
                    .push_bind(&row.contract_address)
                    .push_bind(&row.address)
                    .push_bind(&row.amount)
                    .push_bind(row.height);
            });
            qb.push(
                " ON CONFLICT (chain_name, contract_address, address) DO UPDATE SET \
                 amount = EXCLUDED.amount, height = EXCLUDED.height",
            );
            let result = qb.build().execute(&self.pool).await?;
            Self::check_affected("cw20-balances", chunk.len(), result.rows_affected())?;
        }
        Ok(())
    }

    async fn upsert_cw20_token_infos(&self, rows: &[Cw20TokenInfoRow]) -> Result<(), SinkError> {
        const FIELDS: usize = 7;
        for chunk in chunk_rows(rows, self.max_placeholders, FIELDS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO cw20_token_infos (chain_name, contract_address, name, symbol, decimals, total_supply, height) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.chain_name)
                    .push_bind(&row.contract_address)
                    .push_bind(&row.name)
                    .push_bind(&row.symbol)
                    .push_bind(row.decimals)
                    .push_bind(&row.total_supply)
                    .push_bind(row.height);
            });
            qb.push(
                " ON CONFLICT (chain_name, contract_address) DO UPDATE SET \
                 name = EXCLUDED.name, symbol = EXCLUDED.symbol, \
                 decimals = EXCLUDED.decimals, total_supply = EXCLUDED.total_supply, \
                 height = EXCLUDED.height",
            );
            let result = qb.build().execute(&self.pool).await?;
            Self::check_affected("cw20-token-info", chunk.len(), result.rows_affected())?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl WritebackSink for PostgresSink {
    /// Execute one flush batch. Chunk failures are logged per module and
    /// never abort the remaining writebacks or later flushes.
    async fn persist(&self, ops: Vec<WritebackOp>) {
        for op in &ops {
            if op.rows.is_empty() {
                continue;
            }
            if let Err(e) = self.execute(op).await {
                error!(
                    module = op.module,
                    kind = ?op.kind,
                    rows = op.rows.len(),
                    "writeback failed: {e}"
                );
            }
        }
    }
}
