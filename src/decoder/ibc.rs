//! IBC host-store decoding: clients, connections, channels, denom traces

use prost::Message;

use super::keys::{self, prefix};
use super::proto::{self, TM_CLIENT_STATE_TYPE_URL};
use crate::error::DecodeError;
use crate::models::{DenomTraceRow, IbcChannelRow, IbcClientRow, IbcConnectionRow};
use crate::trace::{Operation, TraceOperation};

/// Connection and channel states both top out at OPEN-ish values; anything
/// outside the published range is a malformed state object.
const MAX_CONNECTION_STATE: i32 = 3;
const MAX_CHANNEL_STATE: i32 = 4;

fn key_utf8<'a>(key: &'a [u8], what: &'static str) -> Result<&'a str, DecodeError> {
    std::str::from_utf8(key).map_err(|_| DecodeError::Utf8 { what })
}

fn validate_identifier(id: &str, field: &'static str) -> Result<(), DecodeError> {
    if id.is_empty() || id.contains('/') {
        return Err(DecodeError::invalid(field, format!("bad identifier {id:?}")));
    }
    Ok(())
}

/// Decode a light-client state write from `clients/<id>/clientState`.
/// Non-tendermint client types are skipped, not errors.
pub fn client_state(chain_name: &str, op: &TraceOperation) -> Result<Option<IbcClientRow>, DecodeError> {
    if op.operation != Operation::Write {
        return Ok(None);
    }

    let key = key_utf8(&op.key, "client key")?;
    let client_id = key
        .strip_prefix("clients/")
        .and_then(|rest| rest.strip_suffix("/clientState"))
        .ok_or_else(|| DecodeError::invalid("client key", format!("unexpected path {key:?}")))?;
    validate_identifier(client_id, "client id")?;

    let any = prost_types::Any::decode(op.value.as_slice())?;
    if any.type_url != TM_CLIENT_STATE_TYPE_URL {
        return Ok(None);
    }

    let state = proto::TmClientState::decode(any.value.as_slice())?;
    if state.chain_id.is_empty() {
        return Err(DecodeError::invalid("client state", "empty chain id"));
    }
    let latest = state
        .latest_height
        .as_ref()
        .ok_or_else(|| DecodeError::invalid("client state", "missing latest height"))?;
    let trusting_period_ns = state
        .trusting_period
        .as_ref()
        .and_then(|d| d.seconds.checked_mul(1_000_000_000)?.checked_add(d.nanos as i64))
        .ok_or_else(|| DecodeError::invalid("client state", "trusting period out of range"))?;

    Ok(Some(IbcClientRow {
        chain_name: chain_name.to_string(),
        client_id: client_id.to_string(),
        counterparty_chain_id: state.chain_id,
        latest_height: latest.revision_height as i64,
        trusting_period_ns,
        height: op.block_height as i64,
    }))
}

/// Decode a connection-end write from `connections/<id>`.
pub fn connection(
    chain_name: &str,
    op: &TraceOperation,
) -> Result<Option<IbcConnectionRow>, DecodeError> {
    if op.operation != Operation::Write {
        return Ok(None);
    }

    let key = key_utf8(&op.key, "connection key")?;
    let connection_id = key
        .strip_prefix("connections/")
        .ok_or_else(|| DecodeError::invalid("connection key", format!("unexpected path {key:?}")))?;
    validate_identifier(connection_id, "connection id")?;

    let end = proto::ConnectionEnd::decode(op.value.as_slice())?;
    if end.state < 0 || end.state > MAX_CONNECTION_STATE {
        return Err(DecodeError::invalid(
            "connection state",
            format!("out of range: {}", end.state),
        ));
    }
    let counterparty = end
        .counterparty
        .ok_or_else(|| DecodeError::invalid("connection end", "missing counterparty"))?;

    Ok(Some(IbcConnectionRow {
        chain_name: chain_name.to_string(),
        connection_id: connection_id.to_string(),
        client_id: end.client_id,
        state: end.state,
        counterparty_client_id: counterparty.client_id,
        counterparty_connection_id: counterparty.connection_id,
        height: op.block_height as i64,
    }))
}

/// Decode a channel-end write from `channelEnds/ports/<port>/channels/<id>`.
/// Channels with an unspecified ordering are skipped.
pub fn channel(chain_name: &str, op: &TraceOperation) -> Result<Option<IbcChannelRow>, DecodeError> {
    if op.operation != Operation::Write {
        return Ok(None);
    }

    let key = key_utf8(&op.key, "channel key")?;
    let rest = key
        .strip_prefix("channelEnds/ports/")
        .ok_or_else(|| DecodeError::invalid("channel key", format!("unexpected path {key:?}")))?;
    let (port_id, channel_id) = rest
        .split_once(keys::IBC_CHANNEL_KEY_INFIX)
        .ok_or_else(|| DecodeError::invalid("channel key", format!("unexpected path {key:?}")))?;
    validate_identifier(port_id, "port id")?;
    validate_identifier(channel_id, "channel id")?;

    let ch = proto::Channel::decode(op.value.as_slice())?;
    if ch.ordering == 0 {
        return Ok(None);
    }
    if ch.state < 0 || ch.state > MAX_CHANNEL_STATE {
        return Err(DecodeError::invalid(
            "channel state",
            format!("out of range: {}", ch.state),
        ));
    }
    let counterparty = ch
        .counterparty
        .ok_or_else(|| DecodeError::invalid("channel end", "missing counterparty"))?;

    Ok(Some(IbcChannelRow {
        chain_name: chain_name.to_string(),
        port_id: port_id.to_string(),
        channel_id: channel_id.to_string(),
        state: ch.state,
        counterparty_port_id: counterparty.port_id,
        counterparty_channel_id: counterparty.channel_id,
        hops: ch.connection_hops.join(","),
        height: op.block_height as i64,
    }))
}

/// Decode a denom-trace write: 32-byte hash key, path/base-denom value.
pub fn denom_trace(chain_name: &str, op: &TraceOperation) -> Result<Option<DenomTraceRow>, DecodeError> {
    if op.operation != Operation::Write {
        return Ok(None);
    }

    if op.key.len() != keys::DENOM_TRACE_KEY_LEN || op.key[0] != prefix::DENOM_TRACE {
        return Ok(None);
    }

    let trace = proto::DenomTrace::decode(op.value.as_slice())?;
    if trace.base_denom.is_empty() {
        return Err(DecodeError::invalid("denom trace", "empty base denom"));
    }

    Ok(Some(DenomTraceRow {
        chain_name: chain_name.to_string(),
        hash: hex::encode(&op.key[1..]),
        path: trace.path,
        base_denom: trace.base_denom,
        height: op.block_height as i64,
    }))
}
