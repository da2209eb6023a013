//! Protobuf value messages for the state objects we index
//!
//! Hand-declared subsets of the chain's wire types. Prost skips unknown
//! fields, so messages only declare the fields the decoders read; tags
//! match the chain's published schemas.

use prost::Message;

pub const BASE_ACCOUNT_TYPE_URL: &str = "/cosmos.auth.v1beta1.BaseAccount";
pub const MODULE_ACCOUNT_TYPE_URL: &str = "/cosmos.auth.v1beta1.ModuleAccount";
pub const TM_CLIENT_STATE_TYPE_URL: &str = "/ibc.lightclients.tendermint.v1.ClientState";

#[derive(Clone, PartialEq, Message)]
pub struct Coin {
    #[prost(string, tag = "1")]
    pub denom: String,
    #[prost(string, tag = "2")]
    pub amount: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct BaseAccount {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(message, optional, tag = "2")]
    pub pub_key: Option<prost_types::Any>,
    #[prost(uint64, tag = "3")]
    pub account_number: u64,
    #[prost(uint64, tag = "4")]
    pub sequence: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Delegation {
    #[prost(string, tag = "1")]
    pub delegator_address: String,
    #[prost(string, tag = "2")]
    pub validator_address: String,
    /// Fixed-point decimal, 18 implicit places.
    #[prost(string, tag = "3")]
    pub shares: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct UnbondingDelegationEntry {
    #[prost(int64, tag = "1")]
    pub creation_height: i64,
    #[prost(message, optional, tag = "2")]
    pub completion_time: Option<prost_types::Timestamp>,
    #[prost(string, tag = "3")]
    pub initial_balance: String,
    #[prost(string, tag = "4")]
    pub balance: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct UnbondingDelegation {
    #[prost(string, tag = "1")]
    pub delegator_address: String,
    #[prost(string, tag = "2")]
    pub validator_address: String,
    #[prost(message, repeated, tag = "3")]
    pub entries: Vec<UnbondingDelegationEntry>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Validator {
    #[prost(string, tag = "1")]
    pub operator_address: String,
    #[prost(message, optional, tag = "2")]
    pub consensus_pubkey: Option<prost_types::Any>,
    #[prost(bool, tag = "3")]
    pub jailed: bool,
    #[prost(int32, tag = "4")]
    pub status: i32,
    #[prost(string, tag = "5")]
    pub tokens: String,
    #[prost(string, tag = "6")]
    pub delegator_shares: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Fraction {
    #[prost(uint64, tag = "1")]
    pub numerator: u64,
    #[prost(uint64, tag = "2")]
    pub denominator: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct RevisionHeight {
    #[prost(uint64, tag = "1")]
    pub revision_number: u64,
    #[prost(uint64, tag = "2")]
    pub revision_height: u64,
}

/// Tendermint light-client state, carried inside an `Any`.
#[derive(Clone, PartialEq, Message)]
pub struct TmClientState {
    #[prost(string, tag = "1")]
    pub chain_id: String,
    #[prost(message, optional, tag = "2")]
    pub trust_level: Option<Fraction>,
    #[prost(message, optional, tag = "3")]
    pub trusting_period: Option<prost_types::Duration>,
    #[prost(message, optional, tag = "4")]
    pub unbonding_period: Option<prost_types::Duration>,
    #[prost(message, optional, tag = "5")]
    pub max_clock_drift: Option<prost_types::Duration>,
    #[prost(message, optional, tag = "6")]
    pub frozen_height: Option<RevisionHeight>,
    #[prost(message, optional, tag = "7")]
    pub latest_height: Option<RevisionHeight>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MerklePrefix {
    #[prost(bytes = "vec", tag = "1")]
    pub key_prefix: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConnectionVersion {
    #[prost(string, tag = "1")]
    pub identifier: String,
    #[prost(string, repeated, tag = "2")]
    pub features: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConnectionCounterparty {
    #[prost(string, tag = "1")]
    pub client_id: String,
    #[prost(string, tag = "2")]
    pub connection_id: String,
    #[prost(message, optional, tag = "3")]
    pub prefix: Option<MerklePrefix>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConnectionEnd {
    #[prost(string, tag = "1")]
    pub client_id: String,
    #[prost(message, repeated, tag = "2")]
    pub versions: Vec<ConnectionVersion>,
    #[prost(int32, tag = "3")]
    pub state: i32,
    #[prost(message, optional, tag = "4")]
    pub counterparty: Option<ConnectionCounterparty>,
    #[prost(uint64, tag = "5")]
    pub delay_period: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChannelCounterparty {
    #[prost(string, tag = "1")]
    pub port_id: String,
    #[prost(string, tag = "2")]
    pub channel_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Channel {
    #[prost(int32, tag = "1")]
    pub state: i32,
    #[prost(int32, tag = "2")]
    pub ordering: i32,
    #[prost(message, optional, tag = "3")]
    pub counterparty: Option<ChannelCounterparty>,
    #[prost(string, repeated, tag = "4")]
    pub connection_hops: Vec<String>,
    #[prost(string, tag = "5")]
    pub version: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct DenomTrace {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(string, tag = "2")]
    pub base_denom: String,
}
