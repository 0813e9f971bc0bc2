// src/core/commands/generic.rs

//! Builders for connection, keyspace and transaction-control commands.

use crate::core::protocol::{Command, ToArg};

pub fn ping() -> Command {
    Command::new("PING")
}

pub fn echo(message: impl ToArg) -> Command {
    Command::new("ECHO").arg(message)
}

/// `AUTH [username] password`.
pub fn auth(username: Option<&str>, password: &str) -> Command {
    let cmd = Command::new("AUTH");
    match username {
        Some(user) => cmd.arg(user).arg(password),
        None => cmd.arg(password),
    }
}

pub fn select(db_index: u32) -> Command {
    Command::new("SELECT").arg(db_index)
}

pub fn del<I, K>(keys: I) -> Command
where
    I: IntoIterator<Item = K>,
    K: ToArg,
{
    Command::new("DEL").args(keys)
}

pub fn watch<I, K>(keys: I) -> Command
where
    I: IntoIterator<Item = K>,
    K: ToArg,
{
    Command::new("WATCH").args(keys)
}

pub fn unwatch() -> Command {
    Command::new("UNWATCH")
}

pub fn multi() -> Command {
    Command::new("MULTI")
}

pub fn exec() -> Command {
    Command::new("EXEC")
}

pub fn discard() -> Command {
    Command::new("DISCARD")
}
