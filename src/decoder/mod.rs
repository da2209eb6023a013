//! Decode boundary: raw store keys/values into typed domain rows
//!
//! Everything in here is stateless. Each entity type gets one function that
//! takes the raw operation and returns `Ok(Some(row))`, `Ok(None)` for
//! "not applicable" (domain filtering, unsupported variants), or a
//! [`DecodeError`](crate::error::DecodeError) for malformed data.

pub mod auth;
pub mod bank;
pub mod codec;
pub mod ibc;
pub mod keys;
pub mod proto;
pub mod staking;
pub mod wasm;

pub use codec::{ChainCodec, CompactCodec, LegacyCodec};

use rust_decimal::Decimal;

use crate::error::DecodeError;

/// Convert a fixed-point integer string (18 implicit decimal places, the
/// chain's decimal wire form) into a `Decimal`.
pub(crate) fn dec_from_units(raw: &str, field: &'static str) -> Result<Decimal, DecodeError> {
    let units: i128 = raw
        .parse()
        .map_err(|_| DecodeError::invalid(field, format!("not an integer: {raw:?}")))?;
    Decimal::try_from_i128_with_scale(units, 18)
        .map(|d| d.normalize())
        .map_err(|e| DecodeError::invalid(field, e.to_string()))
}

/// Amounts on the wire are plain base-10 digit strings.
pub(crate) fn validate_amount(raw: &str, field: &'static str) -> Result<(), DecodeError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::invalid(field, format!("not a base-10 amount: {raw:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dec_from_units_scales_by_18() {
        let d = dec_from_units("1500000000000000000", "shares").unwrap();
        assert_eq!(d, Decimal::new(15, 1));
    }

    #[test]
    fn dec_from_units_rejects_garbage() {
        assert!(dec_from_units("", "shares").is_err());
        assert!(dec_from_units("1.5", "shares").is_err());
        assert!(dec_from_units("abc", "shares").is_err());
    }

    #[test]
    fn amount_validation() {
        assert!(validate_amount("0", "amount").is_ok());
        assert!(validate_amount("123456789012345678901234567890", "amount").is_ok());
        assert!(validate_amount("", "amount").is_err());
        assert!(validate_amount("-5", "amount").is_err());
        assert!(validate_amount("12a", "amount").is_err());
    }
}
