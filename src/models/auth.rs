//! Auth account rows

use serde::{Deserialize, Serialize};

/// Account number and sequence for a base account. Module accounts are
/// filtered out at decode time and never reach this row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthAccountRow {
    pub chain_name: String,
    /// Hex-encoded account address.
    pub address: String,
    pub account_number: i64,
    pub sequence_number: i64,
    pub height: i64,
}
