//! Staking rows: delegations, unbonding delegations, validators

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One delegator/validator pair with its current share amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DelegationRow {
    pub chain_name: String,
    /// Hex-encoded delegator address.
    pub delegator_address: String,
    /// Hex-encoded validator operator address.
    pub validator_address: String,
    pub amount: Decimal,
    pub height: i64,
    /// Set only when the row was produced by a delete-style write.
    pub delete_height: Option<i64>,
}

impl DelegationRow {
    pub fn natural_key(&self) -> (String, String) {
        (self.delegator_address.clone(), self.validator_address.clone())
    }
}

/// An unbonding delegation with its pending entries, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UnbondingDelegationRow {
    pub chain_name: String,
    pub delegator_address: String,
    pub validator_address: String,
    pub entries: serde_json::Value,
    pub height: i64,
    pub delete_height: Option<i64>,
}

impl UnbondingDelegationRow {
    pub fn natural_key(&self) -> (String, String) {
        (self.delegator_address.clone(), self.validator_address.clone())
    }
}

/// Validator state as of the last observed write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ValidatorRow {
    pub chain_name: String,
    /// Hex-encoded operator address.
    pub operator_address: String,
    pub jailed: bool,
    /// Bond status as the chain encodes it (unspecified/unbonded/unbonding/bonded).
    pub status: i32,
    pub tokens: String,
    pub delegator_shares: Decimal,
    pub height: i64,
}
