//! Bank balance rows

use serde::{Deserialize, Serialize};

/// One account's balance in one denomination.
///
/// Amounts are stored as text: chain supplies routinely exceed what any
/// fixed-width integer column can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BalanceRow {
    pub chain_name: String,
    /// Hex-encoded account address.
    pub address: String,
    pub denom: String,
    pub amount: String,
    pub height: i64,
}

impl BalanceRow {
    /// Composite natural key used for cache coalescing.
    pub fn natural_key(&self) -> (String, String) {
        (self.address.clone(), self.denom.clone())
    }
}
