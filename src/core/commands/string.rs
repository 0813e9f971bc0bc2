// src/core/commands/string.rs

//! Builders for the string commands.

use crate::core::protocol::{Command, ToArg};
use std::time::Duration;

/// Defines the condition for `SET` execution (`NX` or `XX`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    IfExists,    // `XX` - Only set if the key already exists.
    IfNotExists, // `NX` - Only set if the key does not already exist.
}

/// Optional modifiers for `SET`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub condition: Option<SetCondition>,
    /// Sent as `PX <milliseconds>`.
    pub expires_in: Option<Duration>,
}

impl SetOptions {
    pub fn if_exists(mut self) -> Self {
        self.condition = Some(SetCondition::IfExists);
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.condition = Some(SetCondition::IfNotExists);
        self
    }

    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_in = Some(ttl);
        self
    }
}

pub fn append(key: impl ToArg, value: impl ToArg) -> Command {
    Command::new("APPEND").arg(key).arg(value)
}

pub fn decr_by(key: impl ToArg, by: i64) -> Command {
    Command::new("DECRBY").arg(key).arg(by)
}

pub fn get(key: impl ToArg) -> Command {
    Command::new("GET").arg(key)
}

pub fn getrange(key: impl ToArg, start: i64, end: i64) -> Command {
    Command::new("GETRANGE").arg(key).arg(start).arg(end)
}

pub fn getset(key: impl ToArg, value: impl ToArg) -> Command {
    Command::new("GETSET").arg(key).arg(value)
}

pub fn incr_by(key: impl ToArg, by: i64) -> Command {
    Command::new("INCRBY").arg(key).arg(by)
}

pub fn incr_by_float(key: impl ToArg, by: f64) -> Command {
    Command::new("INCRBYFLOAT").arg(key).arg(by)
}

pub fn mget<I, K>(keys: I) -> Command
where
    I: IntoIterator<Item = K>,
    K: ToArg,
{
    Command::new("MGET").args(keys)
}

/// `MSET`, or `MSETNX` when `only_if_none_exist` is set.
pub fn mset<I, K, V>(pairs: I, only_if_none_exist: bool) -> Command
where
    I: IntoIterator<Item = (K, V)>,
    K: ToArg,
    V: ToArg,
{
    let mut cmd = Command::new(if only_if_none_exist { "MSETNX" } else { "MSET" });
    for (key, value) in pairs {
        cmd.push_arg(key);
        cmd.push_arg(value);
    }
    cmd
}

pub fn set(key: impl ToArg, value: impl ToArg, options: SetOptions) -> Command {
    let mut cmd = Command::new("SET").arg(key).arg(value);
    match options.condition {
        Some(SetCondition::IfExists) => cmd.push_arg("XX"),
        Some(SetCondition::IfNotExists) => cmd.push_arg("NX"),
        None => {}
    }
    if let Some(ttl) = options.expires_in {
        cmd.push_arg("PX");
        cmd.push_arg(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
    }
    cmd
}

pub fn setrange(key: impl ToArg, offset: u64, value: impl ToArg) -> Command {
    Command::new("SETRANGE").arg(key).arg(offset).arg(value)
}

pub fn strlen(key: impl ToArg) -> Command {
    Command::new("STRLEN").arg(key)
}
