//! Auth account decoding

use prost::Message;

use super::keys;
use super::proto::{BaseAccount, BASE_ACCOUNT_TYPE_URL};
use crate::error::DecodeError;
use crate::models::AuthAccountRow;
use crate::trace::{Operation, TraceOperation};

/// Decode an account write. Module accounts and other non-base account
/// kinds are filtered out, not errors.
pub fn account(chain_name: &str, op: &TraceOperation) -> Result<Option<AuthAccountRow>, DecodeError> {
    if op.operation != Operation::Write {
        return Ok(None);
    }

    let (addr, end) = keys::address_segment(&op.key, 1)?;
    if end != op.key.len() {
        return Err(DecodeError::invalid(
            "account key",
            "trailing bytes after address segment",
        ));
    }

    let any = prost_types::Any::decode(op.value.as_slice())?;
    if any.type_url != BASE_ACCOUNT_TYPE_URL {
        return Ok(None);
    }

    let acct = BaseAccount::decode(any.value.as_slice())?;
    Ok(Some(AuthAccountRow {
        chain_name: chain_name.to_string(),
        address: hex::encode(addr),
        account_number: acct.account_number as i64,
        sequence_number: acct.sequence as i64,
        height: op.block_height as i64,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::proto::MODULE_ACCOUNT_TYPE_URL;
    use super::*;

    fn account_op(addr: &[u8], type_url: &str, acct: &BaseAccount, height: u64) -> TraceOperation {
        let mut key = vec![keys::prefix::AUTH_ACCOUNT, addr.len() as u8];
        key.extend_from_slice(addr);
        let any = prost_types::Any {
            type_url: type_url.to_string(),
            value: acct.encode_to_vec(),
        };
        TraceOperation {
            operation: Operation::Write,
            key,
            value: any.encode_to_vec(),
            block_height: height,
            tx_hash: String::new(),
            suggested_processor: None,
        }
    }

    #[test]
    fn decodes_base_accounts() {
        let acct = BaseAccount {
            address: "addr".into(),
            pub_key: None,
            account_number: 12,
            sequence: 34,
        };
        let op = account_op(&[0x01; 20], BASE_ACCOUNT_TYPE_URL, &acct, 8);
        let row = account("c", &op).unwrap().unwrap();
        assert_eq!(row.account_number, 12);
        assert_eq!(row.sequence_number, 34);
        assert_eq!(row.address, hex::encode([0x01; 20]));
    }

    #[test]
    fn module_accounts_are_filtered() {
        let acct = BaseAccount::default();
        let op = account_op(&[0x01; 20], MODULE_ACCOUNT_TYPE_URL, &acct, 8);
        assert!(account("c", &op).unwrap().is_none());
    }

    #[test]
    fn garbage_value_is_an_error() {
        let mut key = vec![keys::prefix::AUTH_ACCOUNT, 20];
        key.extend_from_slice(&[0x01; 20]);
        let op = TraceOperation {
            operation: Operation::Write,
            key,
            value: vec![0xFF; 16],
            block_height: 1,
            tx_hash: String::new(),
            suggested_processor: None,
        };
        assert!(account("c", &op).is_err());
    }
}
