//! Bank balance decoding

use super::keys;
use super::ChainCodec;
use crate::error::DecodeError;
use crate::models::BalanceRow;
use crate::trace::{Operation, TraceOperation};

/// Decode a balance write into a row. Non-writes, trace-hash shaped keys,
/// unparseable denoms and zero amounts all come back as `None`.
pub fn balance(
    codec: &dyn ChainCodec,
    chain_name: &str,
    op: &TraceOperation,
) -> Result<Option<BalanceRow>, DecodeError> {
    if op.operation != Operation::Write {
        return Ok(None);
    }

    let (addr, denom_start) = keys::address_segment(&op.key, 1)?;
    let denom_bytes = &op.key[denom_start..];
    if denom_bytes.is_empty() {
        return Ok(None);
    }

    let denom = match std::str::from_utf8(denom_bytes) {
        Ok(d) if is_valid_denom(d) => d,
        // A 33-byte trace-hash key can shape-match a balance key; a denom
        // that fails validation is the tell.
        _ => return Ok(None),
    };

    let amount = codec.balance_amount(denom, &op.value)?;
    if amount.bytes().all(|b| b == b'0') {
        return Ok(None);
    }

    Ok(Some(BalanceRow {
        chain_name: chain_name.to_string(),
        address: hex::encode(addr),
        denom: denom.to_string(),
        amount,
        height: op.block_height as i64,
    }))
}

fn is_valid_denom(denom: &str) -> bool {
    denom.len() >= 2
        && denom.len() <= 128
        && denom.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && denom
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::super::CompactCodec;
    use super::*;

    fn balance_op(addr: &[u8], denom: &str, value: &[u8], height: u64) -> TraceOperation {
        let mut key = vec![keys::prefix::BANK_BALANCE, addr.len() as u8];
        key.extend_from_slice(addr);
        key.extend_from_slice(denom.as_bytes());
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
    fn decodes_a_balance_write() {
        let op = balance_op(&[0xAA; 20], "stake", b"1000", 5);
        let row = balance(&CompactCodec, "testchain", &op).unwrap().unwrap();
        assert_eq!(row.address, hex::encode([0xAA; 20]));
        assert_eq!(row.denom, "stake");
        assert_eq!(row.amount, "1000");
        assert_eq!(row.height, 5);
    }

    #[test]
    fn decode_is_idempotent() {
        let op = balance_op(&[0xAB; 32], "uatom", b"42", 9);
        let a = balance(&CompactCodec, "c", &op).unwrap().unwrap();
        let b = balance(&CompactCodec, "c", &op).unwrap().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_amounts_are_filtered() {
        let op = balance_op(&[0xAA; 20], "stake", b"0", 5);
        assert!(balance(&CompactCodec, "c", &op).unwrap().is_none());
        let op = balance_op(&[0xAA; 20], "stake", b"000", 5);
        assert!(balance(&CompactCodec, "c", &op).unwrap().is_none());
    }

    #[test]
    fn invalid_amounts_are_errors() {
        let op = balance_op(&[0xAA; 20], "stake", b"12x", 5);
        assert!(balance(&CompactCodec, "c", &op).is_err());
    }

    #[test]
    fn non_writes_are_not_applicable() {
        let mut op = balance_op(&[0xAA; 20], "stake", b"10", 5);
        op.operation = Operation::Delete;
        assert!(balance(&CompactCodec, "c", &op).unwrap().is_none());
    }

    #[test]
    fn trace_hash_shaped_key_is_not_applicable() {
        // 0x02 + len byte 0x14 + 31 junk bytes: shape-matches a balance key
        // with a 20-byte address and an 11-byte binary "denom".
        let mut key = vec![keys::prefix::BANK_BALANCE, 20];
        key.extend_from_slice(&[0xAA; 20]);
        key.extend_from_slice(&[0xFF; 11]);
        let op = TraceOperation {
            operation: Operation::Write,
            key,
            value: b"10".to_vec(),
            block_height: 1,
            tx_hash: String::new(),
            suggested_processor: None,
        };
        assert!(balance(&CompactCodec, "c", &op).unwrap().is_none());
    }
}
