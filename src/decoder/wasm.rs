//! Contract-token decoding from the wasm contract store
//!
//! Contract state keys are `0x03 || contract(32) || contract-local key`.
//! Token contracts keep holder balances in a namespaced map
//! (`0x00 0x07 "balance" || holder`) and metadata in a plain
//! `"token_info"` item. Contract state values are JSON.

use serde::Deserialize;

use super::keys::{prefix, CONTRACT_ADDRESS_LEN};
use super::validate_amount;
use crate::error::DecodeError;
use crate::models::{Cw20BalanceRow, Cw20TokenInfoRow};
use crate::trace::{Operation, TraceOperation};

pub const BALANCE_NAMESPACE: &[u8] = b"balance";
pub const TOKEN_INFO_KEY: &[u8] = b"token_info";

/// Split a contract-store key into contract address and contract-local key.
fn split_contract_key(key: &[u8]) -> Result<(&[u8], &[u8]), DecodeError> {
    let need = 1 + CONTRACT_ADDRESS_LEN + 1;
    if key.len() < need {
        return Err(DecodeError::KeyTooShort {
            need,
            got: key.len(),
        });
    }
    let contract = &key[1..1 + CONTRACT_ADDRESS_LEN];
    let local = &key[1 + CONTRACT_ADDRESS_LEN..];
    Ok((contract, local))
}

/// The contract-local layout of one balance map entry, if this is one.
fn balance_holder(local: &[u8]) -> Option<&[u8]> {
    // Namespaced map entry: 2-byte big-endian namespace length, namespace,
    // then the map key (the holder address as the contract renders it).
    let ns_len = u16::from_be_bytes([*local.first()?, *local.get(1)?]) as usize;
    if ns_len != BALANCE_NAMESPACE.len() || local.len() < 2 + ns_len + 1 {
        return None;
    }
    if &local[2..2 + ns_len] != BALANCE_NAMESPACE {
        return None;
    }
    Some(&local[2 + ns_len..])
}

/// Cheap shape test for routing: a balance map entry under some contract.
pub fn looks_like_balance_key(key: &[u8]) -> bool {
    key.first() == Some(&prefix::CONTRACT_STORE)
        && key.len() > 1 + CONTRACT_ADDRESS_LEN + 2 + BALANCE_NAMESPACE.len()
        && split_contract_key(key)
            .ok()
            .and_then(|(_, local)| balance_holder(local))
            .is_some()
}

/// Cheap shape test for routing: the token-info item of some contract.
pub fn looks_like_token_info_key(key: &[u8]) -> bool {
    key.first() == Some(&prefix::CONTRACT_STORE)
        && key.len() == 1 + CONTRACT_ADDRESS_LEN + TOKEN_INFO_KEY.len()
        && &key[1 + CONTRACT_ADDRESS_LEN..] == TOKEN_INFO_KEY
}

/// Decode a holder-balance write. The value is a JSON-encoded amount string.
pub fn cw20_balance(
    chain_name: &str,
    op: &TraceOperation,
) -> Result<Option<Cw20BalanceRow>, DecodeError> {
    if op.operation != Operation::Write {
        return Ok(None);
    }

    let (contract, local) = split_contract_key(&op.key)?;
    let Some(holder) = balance_holder(local) else {
        return Ok(None);
    };
    let holder = std::str::from_utf8(holder).map_err(|_| DecodeError::Utf8 {
        what: "balance holder address",
    })?;

    let amount: String = serde_json::from_slice(&op.value)?;
    validate_amount(&amount, "contract balance")?;

    Ok(Some(Cw20BalanceRow {
        chain_name: chain_name.to_string(),
        contract_address: hex::encode(contract),
        address: holder.to_string(),
        amount,
        height: op.block_height as i64,
    }))
}

#[derive(Debug, Deserialize)]
struct TokenInfoState {
    name: String,
    symbol: String,
    decimals: u32,
    total_supply: String,
}

/// Decode a token-info write. The value is the contract's JSON metadata.
pub fn cw20_token_info(
    chain_name: &str,
    op: &TraceOperation,
) -> Result<Option<Cw20TokenInfoRow>, DecodeError> {
    if op.operation != Operation::Write {
        return Ok(None);
    }

    let (contract, local) = split_contract_key(&op.key)?;
    if local != TOKEN_INFO_KEY {
        return Ok(None);
    }

    let info: TokenInfoState = serde_json::from_slice(&op.value)?;
    if info.name.is_empty() || info.symbol.is_empty() {
        return Err(DecodeError::invalid(
            "token info",
            "empty name or symbol",
        ));
    }
    validate_amount(&info.total_supply, "token total supply")?;

    Ok(Some(Cw20TokenInfoRow {
        chain_name: chain_name.to_string(),
        contract_address: hex::encode(contract),
        name: info.name,
        symbol: info.symbol,
        decimals: info.decimals as i32,
        total_supply: info.total_supply,
        height: op.block_height as i64,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: [u8; 32] = [0xC0; 32];

    fn balance_key(holder: &str) -> Vec<u8> {
        let mut key = vec![prefix::CONTRACT_STORE];
        key.extend_from_slice(&CONTRACT);
        key.extend_from_slice(&(BALANCE_NAMESPACE.len() as u16).to_be_bytes());
        key.extend_from_slice(BALANCE_NAMESPACE);
        key.extend_from_slice(holder.as_bytes());
        key
    }

    fn token_info_key() -> Vec<u8> {
        let mut key = vec![prefix::CONTRACT_STORE];
        key.extend_from_slice(&CONTRACT);
        key.extend_from_slice(TOKEN_INFO_KEY);
        key
    }

    fn write_op(key: Vec<u8>, value: &[u8], height: u64) -> TraceOperation {
        TraceOperation {
            operation: Operation::Write,
            key,
            value: value.to_vec(),
            block_height: height,
            tx_hash: String::new(),
            suggested_processor: None,
        }
    }

    #[test]
    fn decodes_holder_balances() {
        let op = write_op(balance_key("wasm1holder"), br#""250""#, 3);
        let row = cw20_balance("c", &op).unwrap().unwrap();
        assert_eq!(row.contract_address, hex::encode(CONTRACT));
        assert_eq!(row.address, "wasm1holder");
        assert_eq!(row.amount, "250");
    }

    #[test]
    fn other_map_namespaces_are_not_applicable() {
        let mut key = vec![prefix::CONTRACT_STORE];
        key.extend_from_slice(&CONTRACT);
        key.extend_from_slice(&7u16.to_be_bytes());
        key.extend_from_slice(b"allowan");
        key.extend_from_slice(b"wasm1spender");
        let op = write_op(key, br#""250""#, 3);
        assert!(cw20_balance("c", &op).unwrap().is_none());
    }

    #[test]
    fn bad_balance_json_is_an_error() {
        let op = write_op(balance_key("wasm1holder"), b"not-json", 3);
        assert!(cw20_balance("c", &op).is_err());
        let op = write_op(balance_key("wasm1holder"), br#""12x""#, 3);
        assert!(cw20_balance("c", &op).is_err());
    }

    #[test]
    fn decodes_token_info() {
        let value = br#"{"name":"Test Token","symbol":"TST","decimals":6,"total_supply":"1000000"}"#;
        let op = write_op(token_info_key(), value, 4);
        let row = cw20_token_info("c", &op).unwrap().unwrap();
        assert_eq!(row.symbol, "TST");
        assert_eq!(row.decimals, 6);
        assert_eq!(row.total_supply, "1000000");
    }

    #[test]
    fn key_shapes_route_correctly() {
        assert!(looks_like_balance_key(&balance_key("wasm1holder")));
        assert!(!looks_like_balance_key(&token_info_key()));
        assert!(looks_like_token_info_key(&token_info_key()));
        assert!(!looks_like_token_info_key(&balance_key("wasm1holder")));
    }
}
