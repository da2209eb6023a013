//! Contract-token rows decoded from contract state

use serde::{Deserialize, Serialize};

/// One holder's balance in one token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cw20BalanceRow {
    pub chain_name: String,
    /// Hex-encoded contract address.
    pub contract_address: String,
    /// Holder address as the contract stores it.
    pub address: String,
    pub amount: String,
    pub height: i64,
}

impl Cw20BalanceRow {
    pub fn natural_key(&self) -> (String, String) {
        (self.contract_address.clone(), self.address.clone())
    }
}

/// Token metadata kept by a token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cw20TokenInfoRow {
    pub chain_name: String,
    pub contract_address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: i32,
    pub total_supply: String,
    pub height: i64,
}
