// src/core/commands/bitmap.rs

//! Builders for the bit-level string commands.

use crate::core::protocol::{Command, ToArg};
use strum_macros::{AsRefStr, Display};

/// Defines the supported bitwise operations for the BITOP command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum BitOperation {
    And,
    Or,
    Xor,
    /// Takes exactly one source key; the server rejects more.
    Not,
}

pub fn bitcount(key: impl ToArg) -> Command {
    Command::new("BITCOUNT").arg(key)
}

pub fn bitcount_range(key: impl ToArg, start: i64, end: i64) -> Command {
    Command::new("BITCOUNT").arg(key).arg(start).arg(end)
}

pub fn bitop<I, K>(operation: BitOperation, dest_key: impl ToArg, src_keys: I) -> Command
where
    I: IntoIterator<Item = K>,
    K: ToArg,
{
    let op: &str = operation.as_ref();
    Command::new("BITOP").arg(op).arg(dest_key).args(src_keys)
}

pub fn bitpos(key: impl ToArg, bit: bool) -> Command {
    Command::new("BITPOS").arg(key).arg(bit)
}

/// `BITPOS key bit start [end]`.
pub fn bitpos_range(key: impl ToArg, bit: bool, start: i64, end: Option<i64>) -> Command {
    let cmd = Command::new("BITPOS").arg(key).arg(bit).arg(start);
    match end {
        Some(end) => cmd.arg(end),
        None => cmd,
    }
}

pub fn getbit(key: impl ToArg, offset: u64) -> Command {
    Command::new("GETBIT").arg(key).arg(offset)
}

pub fn setbit(key: impl ToArg, offset: u64, value: bool) -> Command {
    Command::new("SETBIT").arg(key).arg(offset).arg(value)
}
