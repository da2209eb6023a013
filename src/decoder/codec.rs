//! Value-encoding strategy for schema differences between chain versions
//!
//! Newer nodes store a bank balance as the bare amount string; older ones
//! store a full Coin message. The strategy is picked once at startup from
//! configuration and shared behind a trait object.

use std::sync::Arc;

use anyhow::bail;
use prost::Message;

use super::proto::Coin;
use super::validate_amount;
use crate::error::DecodeError;

pub trait ChainCodec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode the value side of a bank balance write into an amount string.
    /// `denom` is the denom parsed from the key.
    fn balance_amount(&self, denom: &str, value: &[u8]) -> Result<String, DecodeError>;
}

/// Current scheme: the value is the amount digits, nothing else.
pub struct CompactCodec;

impl ChainCodec for CompactCodec {
    fn name(&self) -> &'static str {
        "compact"
    }

    fn balance_amount(&self, _denom: &str, value: &[u8]) -> Result<String, DecodeError> {
        let amount = std::str::from_utf8(value)
            .map_err(|_| DecodeError::Utf8 { what: "balance amount" })?;
        validate_amount(amount, "balance amount")?;
        Ok(amount.to_string())
    }
}

/// Older scheme: the value is a Coin message repeating the denom.
pub struct LegacyCodec;

impl ChainCodec for LegacyCodec {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn balance_amount(&self, denom: &str, value: &[u8]) -> Result<String, DecodeError> {
        let coin = Coin::decode(value)?;
        if coin.denom != denom {
            return Err(DecodeError::invalid(
                "balance denom",
                format!("key says {denom:?}, value says {:?}", coin.denom),
            ));
        }
        validate_amount(&coin.amount, "balance amount")?;
        Ok(coin.amount)
    }
}

/// Resolve the configured codec name.
pub fn from_name(name: &str) -> anyhow::Result<Arc<dyn ChainCodec>> {
    match name {
        "compact" => Ok(Arc::new(CompactCodec)),
        "legacy" => Ok(Arc::new(LegacyCodec)),
        other => bail!("unknown codec {other:?}, expected \"compact\" or \"legacy\""),
    }
}
