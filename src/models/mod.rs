//! Typed domain rows produced by the decoders
//!
//! Each row carries the chain it belongs to, its natural key fields and the
//! block height of the last write that produced it. Rows are the unit
//! exchanged between module processors and the database sink.

pub mod auth;
pub mod bank;
pub mod ibc;
pub mod staking;
pub mod wasm;

pub use auth::*;
pub use bank::*;
pub use ibc::*;
pub use staking::*;
pub use wasm::*;
