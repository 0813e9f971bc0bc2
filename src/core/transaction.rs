// src/core/transaction.rs

//! Client-side `MULTI`/`EXEC` transactions.
//!
//! A [`Transaction`] collects commands locally and sends nothing until
//! [`Transaction::commit`]. The commit protocol itself lives in [`CommitMachine`],
//! a network-free state machine that is fed one reply at a time and answers with
//! the next [`Step`]. Commands are queued strictly one at a time: each must be
//! acknowledged with `+QUEUED` before the next one is written.

use crate::client::Client;
use crate::core::commands::{BitOperation, SetOptions, bitmap, generic, string};
use crate::core::protocol::{Command, Response, ToArg};
use crate::core::{ClientError, Result};
use tracing::{debug, warn};

/// The sub-states of a commit in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitPhase {
    /// `MULTI` has been sent.
    AwaitingMulti,
    /// Queued command number `cursor` has been sent; `cursor` commands are acknowledged.
    Queueing { cursor: usize },
    /// Every command was acknowledged and `EXEC` has been sent.
    AwaitingExec,
    /// A command was refused, `DISCARD` has been sent and `offending` is held for the caller.
    Discarding { offending: Response },
}

/// The lifecycle of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionState {
    Building,
    Committing(CommitPhase),
    Completed,
    Aborted,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Completed | TransactionState::Aborted)
    }
}

/// What the driver has to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Write this command and feed its reply back through [`CommitMachine::advance`].
    Issue(Command),
    /// The commit is over; this is the caller's result.
    Finish(Response),
}

/// The commit protocol as an explicit state machine.
#[derive(Debug, Clone)]
pub struct CommitMachine {
    queued: Vec<Command>,
    state: TransactionState,
}

impl CommitMachine {
    pub fn new(queued: Vec<Command>) -> Self {
        Self {
            queued,
            state: TransactionState::Building,
        }
    }

    pub fn state(&self) -> &TransactionState {
        &self.state
    }

    pub fn queued(&self) -> &[Command] {
        &self.queued
    }

    /// Leaves `Building` and asks for `MULTI`.
    pub fn start(&mut self) -> Result<Step> {
        if self.state != TransactionState::Building {
            return Err(ClientError::InvalidState(format!(
                "transaction already started ({:?})",
                self.state
            )));
        }
        self.state = TransactionState::Committing(CommitPhase::AwaitingMulti);
        Ok(Step::Issue(generic::multi()))
    }

    /// Consumes the reply to the last issued command.
    pub fn advance(&mut self, reply: Response) -> Result<Step> {
        let phase = match std::mem::replace(&mut self.state, TransactionState::Aborted) {
            TransactionState::Committing(phase) => phase,
            other => {
                let msg = format!("no transaction command is awaiting a reply ({other:?})");
                self.state = other;
                return Err(ClientError::InvalidState(msg));
            }
        };

        match phase {
            CommitPhase::AwaitingMulti if reply.is_ok() => Ok(self.issue_queued(0)),
            CommitPhase::AwaitingMulti => {
                // The server never entered MULTI, so there is nothing to discard.
                warn!("MULTI was refused: {reply:?}");
                Ok(Step::Finish(reply))
            }
            CommitPhase::Queueing { cursor } if reply.is_status("QUEUED") => {
                Ok(self.issue_queued(cursor + 1))
            }
            CommitPhase::Queueing { cursor } => {
                warn!(
                    "Command #{} ({}) was not queued: {reply:?}. Discarding transaction.",
                    cursor,
                    self.queued[cursor].name_lossy()
                );
                self.state =
                    TransactionState::Committing(CommitPhase::Discarding { offending: reply });
                Ok(Step::Issue(generic::discard()))
            }
            CommitPhase::AwaitingExec => {
                self.state = TransactionState::Completed;
                Ok(Step::Finish(reply))
            }
            CommitPhase::Discarding { offending } => {
                debug!("DISCARD replied {reply:?}");
                Ok(Step::Finish(offending))
            }
        }
    }

    /// Marks the commit as failed without a reply, e.g. after a transport error.
    pub fn abort(&mut self) {
        self.state = TransactionState::Aborted;
    }

    /// Whether the server may be inside `MULTI` with no `EXEC` or `DISCARD` sent yet.
    pub fn holds_server_multi(&self) -> bool {
        matches!(
            self.state,
            TransactionState::Committing(CommitPhase::AwaitingMulti | CommitPhase::Queueing { .. })
        )
    }

    fn issue_queued(&mut self, cursor: usize) -> Step {
        match self.queued.get(cursor) {
            Some(cmd) => {
                self.state = TransactionState::Committing(CommitPhase::Queueing { cursor });
                Step::Issue(cmd.clone())
            }
            None => {
                self.state = TransactionState::Committing(CommitPhase::AwaitingExec);
                Step::Issue(generic::exec())
            }
        }
    }
}

/// A transaction being built on a borrowed [`Client`].
///
/// The mutable borrow keeps every other command off the connection until the
/// transaction is committed or dropped. Dropping it before `commit` sends nothing.
pub struct Transaction<'a> {
    client: &'a mut Client,
    queued: Vec<Command>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(client: &'a mut Client) -> Self {
        Self {
            client,
            queued: Vec::new(),
        }
    }

    /// Queues an arbitrary command.
    pub fn queue(&mut self, command: Command) -> &mut Self {
        self.queued.push(command);
        self
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.queued
    }

    /// Runs `MULTI`, the queued commands and `EXEC`, and returns the outcome.
    ///
    /// * `EXEC`'s reply when every command was queued: an array with one element per
    ///   command, or a nil array if the server aborted the transaction (e.g. a
    ///   `WATCH`ed key changed).
    /// * `MULTI`'s reply if it was not `+OK`.
    /// * The first reply that was not `+QUEUED`, after `DISCARD` has been sent.
    ///
    /// Transport and protocol failures are returned as `Err`. An empty queued
    /// command fails the commit before anything is sent. If the returned future is
    /// dropped between `MULTI` and `EXEC`, `DISCARD` is sent so the connection
    /// leaves the transaction.
    pub async fn commit(self) -> Result<Response> {
        if let Some(pos) = self.queued.iter().position(Command::is_empty) {
            return Err(ClientError::Protocol(format!(
                "queued command #{pos} is empty"
            )));
        }

        let mut driver = CommitDriver {
            client: self.client,
            machine: CommitMachine::new(self.queued),
        };
        debug!(
            "Committing transaction with {} queued commands.",
            driver.machine.queued().len()
        );
        driver.run().await
    }

    // --- Typed queue helpers ---

    pub fn append(&mut self, key: impl ToArg, value: impl ToArg) -> &mut Self {
        self.queue(string::append(key, value))
    }

    pub fn bitcount(&mut self, key: impl ToArg) -> &mut Self {
        self.queue(bitmap::bitcount(key))
    }

    pub fn bitcount_range(&mut self, key: impl ToArg, start: i64, end: i64) -> &mut Self {
        self.queue(bitmap::bitcount_range(key, start, end))
    }

    pub fn bitop<I, K>(
        &mut self,
        operation: BitOperation,
        dest_key: impl ToArg,
        src_keys: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = K>,
        K: ToArg,
    {
        self.queue(bitmap::bitop(operation, dest_key, src_keys))
    }

    pub fn bitpos(&mut self, key: impl ToArg, bit: bool) -> &mut Self {
        self.queue(bitmap::bitpos(key, bit))
    }

    pub fn bitpos_range(
        &mut self,
        key: impl ToArg,
        bit: bool,
        start: i64,
        end: Option<i64>,
    ) -> &mut Self {
        self.queue(bitmap::bitpos_range(key, bit, start, end))
    }

    pub fn decr_by(&mut self, key: impl ToArg, by: i64) -> &mut Self {
        self.queue(string::decr_by(key, by))
    }

    pub fn del<I, K>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = K>,
        K: ToArg,
    {
        self.queue(generic::del(keys))
    }

    pub fn get(&mut self, key: impl ToArg) -> &mut Self {
        self.queue(string::get(key))
    }

    pub fn getbit(&mut self, key: impl ToArg, offset: u64) -> &mut Self {
        self.queue(bitmap::getbit(key, offset))
    }

    pub fn getrange(&mut self, key: impl ToArg, start: i64, end: i64) -> &mut Self {
        self.queue(string::getrange(key, start, end))
    }

    pub fn getset(&mut self, key: impl ToArg, value: impl ToArg) -> &mut Self {
        self.queue(string::getset(key, value))
    }

    pub fn incr_by(&mut self, key: impl ToArg, by: i64) -> &mut Self {
        self.queue(string::incr_by(key, by))
    }

    pub fn incr_by_float(&mut self, key: impl ToArg, by: f64) -> &mut Self {
        self.queue(string::incr_by_float(key, by))
    }

    pub fn mget<I, K>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = K>,
        K: ToArg,
    {
        self.queue(string::mget(keys))
    }

    pub fn mset<I, K, V>(&mut self, pairs: I, only_if_none_exist: bool) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: ToArg,
        V: ToArg,
    {
        self.queue(string::mset(pairs, only_if_none_exist))
    }

    pub fn select(&mut self, db_index: u32) -> &mut Self {
        self.queue(generic::select(db_index))
    }

    pub fn set(&mut self, key: impl ToArg, value: impl ToArg) -> &mut Self {
        self.queue(string::set(key, value, SetOptions::default()))
    }

    pub fn set_with(
        &mut self,
        key: impl ToArg,
        value: impl ToArg,
        options: SetOptions,
    ) -> &mut Self {
        self.queue(string::set(key, value, options))
    }

    pub fn setbit(&mut self, key: impl ToArg, offset: u64, value: bool) -> &mut Self {
        self.queue(bitmap::setbit(key, offset, value))
    }

    pub fn setrange(&mut self, key: impl ToArg, offset: u64, value: impl ToArg) -> &mut Self {
        self.queue(string::setrange(key, offset, value))
    }

    pub fn strlen(&mut self, key: impl ToArg) -> &mut Self {
        self.queue(string::strlen(key))
    }
}

/// Feeds replies from the client into a [`CommitMachine`].
///
/// Dropped while the server may still be inside `MULTI`, it sends `DISCARD`
/// without waiting; the dispatcher consumes the replies nobody awaits.
struct CommitDriver<'c> {
    client: &'c mut Client,
    machine: CommitMachine,
}

impl CommitDriver<'_> {
    async fn run(&mut self) -> Result<Response> {
        let mut step = self.machine.start()?;
        loop {
            match step {
                Step::Issue(command) => {
                    let reply = self
                        .client
                        .issue(command)
                        .await
                        .inspect_err(|e| warn!("Transaction aborted by connection failure: {e}"))?;
                    step = self.machine.advance(reply)?;
                }
                Step::Finish(reply) => {
                    debug!("Transaction finished in state {:?}", self.machine.state());
                    return Ok(reply);
                }
            }
        }
    }
}

impl Drop for CommitDriver<'_> {
    fn drop(&mut self) {
        if !self.machine.holds_server_multi() {
            return;
        }
        self.machine.abort();
        if self.client.is_closed() {
            return;
        }
        warn!("Transaction abandoned before EXEC. Sending DISCARD.");
        drop(self.client.submit(generic::discard()));
    }
}
