//! Wire envelope for state-store trace lines
//!
//! The node emits one JSON object per store operation:
//!
//! ```json
//! {"operation":"write","key":"<base64>","value":"<base64>",
//!  "metadata":{"blockHeight":42,"txHash":"..."}}
//! ```
//!
//! Missing metadata means height 0, which never triggers a flush.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::WatchError;

/// Kind of store operation recorded in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Write,
    Delete,
    Read,
    IterRange,
}

impl Operation {
    /// The raw-line fragment used for pre-filtering before JSON parsing.
    pub fn filter_token(&self) -> &'static str {
        match self {
            Operation::Write => r#""operation":"write""#,
            Operation::Delete => r#""operation":"delete""#,
            Operation::Read => r#""operation":"read""#,
            Operation::IterRange => r#""operation":"iterRange""#,
        }
    }
}

/// One decoded store operation, immutable once dispatched.
#[derive(Debug, Clone)]
pub struct TraceOperation {
    pub operation: Operation,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub block_height: u64,
    pub tx_hash: String,
    /// When set, routing is restricted to the named module. Only the bulk
    /// importer sets this.
    pub suggested_processor: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    operation: Operation,
    key: Option<String>,
    value: Option<String>,
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    block_height: Option<u64>,
    tx_hash: Option<String>,
}

fn decode_b64(field: &'static str, raw: Option<&str>) -> Result<Vec<u8>, WatchError> {
    match raw {
        None | Some("") => Ok(Vec::new()),
        Some(s) => BASE64
            .decode(s)
            .map_err(|source| WatchError::Base64 { field, source }),
    }
}

/// Parse one trace line into a [`TraceOperation`].
pub fn parse_envelope(line: &str) -> Result<TraceOperation, WatchError> {
    let raw: RawEnvelope = serde_json::from_str(line)?;
    let (block_height, tx_hash) = match raw.metadata {
        Some(meta) => (
            meta.block_height.unwrap_or(0),
            meta.tx_hash.unwrap_or_default(),
        ),
        None => (0, String::new()),
    };

    Ok(TraceOperation {
        operation: raw.operation,
        key: decode_b64("key", raw.key.as_deref())?,
        value: decode_b64("value", raw.value.as_deref())?,
        block_height,
        tx_hash,
        suggested_processor: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_write_envelope() {
        let line = r#"{"operation":"write","key":"AgE=","value":"MTIz","metadata":{"blockHeight":42,"txHash":"abc"}}"#;
        let op = parse_envelope(line).unwrap();
        assert_eq!(op.operation, Operation::Write);
        assert_eq!(op.key, vec![0x02, 0x01]);
        assert_eq!(op.value, b"123".to_vec());
        assert_eq!(op.block_height, 42);
        assert_eq!(op.tx_hash, "abc");
        assert!(op.suggested_processor.is_none());
    }

    #[test]
    fn missing_metadata_means_height_zero() {
        let line = r#"{"operation":"delete","key":"AgE="}"#;
        let op = parse_envelope(line).unwrap();
        assert_eq!(op.operation, Operation::Delete);
        assert_eq!(op.block_height, 0);
        assert!(op.value.is_empty());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_envelope("not json").is_err());
        assert!(parse_envelope(r#"{"operation":"exterminate"}"#).is_err());
    }

    #[test]
    fn rejects_bad_base64() {
        let line = r#"{"operation":"write","key":"!!!","value":"MTIz"}"#;
        assert!(matches!(
            parse_envelope(line),
            Err(WatchError::Base64 { field: "key", .. })
        ));
    }

    #[test]
    fn decoding_is_idempotent() {
        let line = r#"{"operation":"write","key":"AgE=","value":"MTIz","metadata":{"blockHeight":7,"txHash":"t"}}"#;
        let a = parse_envelope(line).unwrap();
        let b = parse_envelope(line).unwrap();
        assert_eq!(a.key, b.key);
        assert_eq!(a.value, b.value);
        assert_eq!(a.block_height, b.block_height);
    }

    #[test]
    fn filter_tokens_match_wire_form() {
        let line = r#"{"operation":"iterRange","key":"AgE="}"#;
        assert!(line.contains(Operation::IterRange.filter_token()));
        assert!(!line.contains(Operation::Write.filter_token()));
    }
}
