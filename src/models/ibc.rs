//! IBC rows: clients, connections, channels, denom traces

use serde::{Deserialize, Serialize};

/// A light client tracked by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IbcClientRow {
    pub chain_name: String,
    pub client_id: String,
    /// Chain id of the counterparty the client tracks.
    pub counterparty_chain_id: String,
    pub latest_height: i64,
    pub trusting_period_ns: i64,
    pub height: i64,
}

/// One end of an IBC connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IbcConnectionRow {
    pub chain_name: String,
    pub connection_id: String,
    pub client_id: String,
    pub state: i32,
    pub counterparty_client_id: String,
    pub counterparty_connection_id: String,
    pub height: i64,
}

/// One end of an IBC channel, identified by port and channel id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IbcChannelRow {
    pub chain_name: String,
    pub port_id: String,
    pub channel_id: String,
    pub state: i32,
    pub counterparty_port_id: String,
    pub counterparty_channel_id: String,
    /// Comma-joined connection hop ids.
    pub hops: String,
    pub height: i64,
}

/// A fungible token trace: maps the hashed denom back to its path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DenomTraceRow {
    pub chain_name: String,
    /// Hex-encoded trace hash (the part after `ibc/` in the denom).
    pub hash: String,
    pub path: String,
    pub base_denom: String,
    pub height: i64,
}
