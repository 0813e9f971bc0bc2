// src/core/mod.rs

//! The protocol layer, command builders, transactions and the error type.

pub mod commands;
pub mod errors;
pub mod protocol;
pub mod transaction;

pub use errors::{ClientError, Result};
pub use protocol::{Command, RespCodec, Response, ToArg};
pub use transaction::Transaction;
