//! Staking decoding: delegations, unbonding delegations, validators

use prost::Message;
use rust_decimal::Decimal;

use super::keys::{self, prefix};
use super::proto;
use super::{dec_from_units, validate_amount};
use crate::error::DecodeError;
use crate::models::{DelegationRow, UnbondingDelegationRow, ValidatorRow};
use crate::trace::{Operation, TraceOperation};

/// Bond status values the chain emits (unspecified..bonded).
const MAX_BOND_STATUS: i32 = 3;

fn pair_addresses(key: &[u8]) -> Result<(String, String), DecodeError> {
    let (delegator, next) = keys::address_segment(key, 1)?;
    let (validator, end) = keys::address_segment(key, next)?;
    if end != key.len() {
        return Err(DecodeError::invalid(
            "pair key",
            "trailing bytes after validator segment",
        ));
    }
    Ok((hex::encode(delegator), hex::encode(validator)))
}

/// Decode a delegation write or delete. Deletes carry no value and decode
/// the natural key only.
pub fn delegation(
    chain_name: &str,
    op: &TraceOperation,
) -> Result<Option<DelegationRow>, DecodeError> {
    match op.operation {
        Operation::Write => {
            let (delegator_address, validator_address) = pair_addresses(&op.key)?;
            let d = proto::Delegation::decode(op.value.as_slice())?;
            let amount = dec_from_units(&d.shares, "delegation shares")?;
            Ok(Some(DelegationRow {
                chain_name: chain_name.to_string(),
                delegator_address,
                validator_address,
                amount,
                height: op.block_height as i64,
                delete_height: None,
            }))
        }
        Operation::Delete => {
            let (delegator_address, validator_address) = pair_addresses(&op.key)?;
            Ok(Some(DelegationRow {
                chain_name: chain_name.to_string(),
                delegator_address,
                validator_address,
                amount: Decimal::ZERO,
                height: op.block_height as i64,
                delete_height: Some(op.block_height as i64),
            }))
        }
        _ => Ok(None),
    }
}

/// Decode an unbonding-delegation write or delete.
///
/// Keys under the by-validator secondary index (0x33) are treated as a
/// no-op in both directions: the index pairs the same addresses in the
/// opposite order and the primary record always receives its own
/// operation in the same block, so acting here would double-apply.
pub fn unbonding_delegation(
    chain_name: &str,
    op: &TraceOperation,
) -> Result<Option<UnbondingDelegationRow>, DecodeError> {
    if op.key.first() == Some(&prefix::UNBONDING_BY_VALIDATOR) {
        return Ok(None);
    }

    match op.operation {
        Operation::Write => {
            let (delegator_address, validator_address) = pair_addresses(&op.key)?;
            let u = proto::UnbondingDelegation::decode(op.value.as_slice())?;
            Ok(Some(UnbondingDelegationRow {
                chain_name: chain_name.to_string(),
                delegator_address,
                validator_address,
                entries: entries_json(&u.entries)?,
                height: op.block_height as i64,
                delete_height: None,
            }))
        }
        Operation::Delete => {
            let (delegator_address, validator_address) = pair_addresses(&op.key)?;
            Ok(Some(UnbondingDelegationRow {
                chain_name: chain_name.to_string(),
                delegator_address,
                validator_address,
                entries: serde_json::Value::Array(Vec::new()),
                height: op.block_height as i64,
                delete_height: Some(op.block_height as i64),
            }))
        }
        _ => Ok(None),
    }
}

fn entries_json(
    entries: &[proto::UnbondingDelegationEntry],
) -> Result<serde_json::Value, DecodeError> {
    let mut out = Vec::with_capacity(entries.len());
    for e in entries {
        validate_amount(&e.balance, "unbonding balance")?;
        validate_amount(&e.initial_balance, "unbonding initial balance")?;
        out.push(serde_json::json!({
            "creation_height": e.creation_height,
            "completion_time": e.completion_time.as_ref().and_then(timestamp_rfc3339),
            "initial_balance": e.initial_balance,
            "balance": e.balance,
        }));
    }
    Ok(serde_json::Value::Array(out))
}

fn timestamp_rfc3339(ts: &prost_types::Timestamp) -> Option<String> {
    chrono::DateTime::from_timestamp(ts.seconds, ts.nanos.try_into().ok()?)
        .map(|dt| dt.to_rfc3339())
}

/// Decode a validator write. Only writes are applicable; validator records
/// are never deleted from the store, they transition through statuses.
pub fn validator(chain_name: &str, op: &TraceOperation) -> Result<Option<ValidatorRow>, DecodeError> {
    if op.operation != Operation::Write {
        return Ok(None);
    }

    let (operator, end) = keys::address_segment(&op.key, 1)?;
    if end != op.key.len() {
        return Err(DecodeError::invalid(
            "validator key",
            "trailing bytes after operator segment",
        ));
    }

    let v = proto::Validator::decode(op.value.as_slice())?;
    if v.status < 0 || v.status > MAX_BOND_STATUS {
        return Err(DecodeError::invalid(
            "validator status",
            format!("out of range: {}", v.status),
        ));
    }
    validate_amount(&v.tokens, "validator tokens")?;

    Ok(Some(ValidatorRow {
        chain_name: chain_name.to_string(),
        operator_address: hex::encode(operator),
        jailed: v.jailed,
        status: v.status,
        tokens: v.tokens,
        delegator_shares: dec_from_units(&v.delegator_shares, "validator shares")?,
        height: op.block_height as i64,
    }))
}
