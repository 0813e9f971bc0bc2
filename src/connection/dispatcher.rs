// src/connection/dispatcher.rs

//! Owns one transport and matches replies to commands in send order.
//!
//! RESP carries no correlation ids: the n-th reply on a connection answers the
//! n-th command. The dispatcher keeps that pairing with a FIFO of reply senders.
//! A writer task appends the senders for a batch to the FIFO and only then writes
//! the batch; a reader task decodes replies and completes the FIFO head for each.
//!
//! Any transport or framing failure is fatal: it is recorded, delivered to every
//! pending reply and to every later submission.

use crate::core::protocol::{Command, RespCodec, Response};
use crate::core::{ClientError, Result};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf, split};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

type ReplySender = oneshot::Sender<Result<Response>>;

/// A batch of commands handed to the writer task, with one reply sender per command.
struct Submission {
    commands: Vec<Command>,
    replies: Vec<ReplySender>,
}

/// State shared by the handle and both tasks.
#[derive(Default)]
struct Shared {
    pending: Mutex<PendingQueue>,
}

#[derive(Default)]
struct PendingQueue {
    waiters: VecDeque<ReplySender>,
    failure: Option<ClientError>,
}

impl Shared {
    /// Registers the reply senders of a batch, unless the connection already failed.
    fn register(&self, replies: Vec<ReplySender>) -> std::result::Result<(), ClientError> {
        let mut pending = self.pending.lock();
        if let Some(err) = &pending.failure {
            let err = err.clone();
            drop(pending);
            for reply in replies {
                let _ = reply.send(Err(err.clone()));
            }
            return Err(err);
        }
        pending.waiters.extend(replies);
        Ok(())
    }

    /// Hands a reply to the oldest waiter.
    fn complete_next(&self, reply: Response) -> std::result::Result<(), Response> {
        let waiter = self.pending.lock().waiters.pop_front();
        match waiter {
            Some(tx) => {
                if tx.send(Ok(reply)).is_err() {
                    debug!("Discarding reply for an abandoned command.");
                }
                Ok(())
            }
            None => Err(reply),
        }
    }

    /// Records the first failure and fails every waiter with it.
    fn fail(&self, err: ClientError) {
        let (waiters, err) = {
            let mut pending = self.pending.lock();
            let err = pending.failure.get_or_insert(err).clone();
            (std::mem::take(&mut pending.waiters), err)
        };
        if !waiters.is_empty() {
            warn!("Failing {} pending replies: {err}", waiters.len());
        }
        for waiter in waiters {
            let _ = waiter.send(Err(err.clone()));
        }
    }

    fn failure(&self) -> Option<ClientError> {
        self.pending.lock().failure.clone()
    }
}

/// The future of one reply. Dropping it does not withdraw the command; its reply
/// is still read off the connection and thrown away.
pub struct PendingReply {
    rx: oneshot::Receiver<Result<Response>>,
    shared: Arc<Shared>,
}

impl Future for PendingReply {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The sender was dropped without an answer: the tasks are gone.
            Poll::Ready(Err(_)) => Poll::Ready(Err(self
                .shared
                .failure()
                .unwrap_or(ClientError::ConnectionClosed))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// The connection dispatcher.
pub struct Dispatcher {
    submit_tx: mpsc::UnboundedSender<Submission>,
    shared: Arc<Shared>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Dispatcher {
    /// Takes ownership of `stream` and starts the reader and writer tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = split(stream);
        let shared = Arc::new(Shared::default());
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(
            FramedWrite::new(write_half, RespCodec::new()),
            submit_rx,
            shared.clone(),
        ));
        let reader = tokio::spawn(read_loop(
            FramedRead::new(read_half, RespCodec::new()),
            shared.clone(),
        ));

        Self {
            submit_tx,
            shared,
            writer,
            reader,
        }
    }

    /// Queues `command` for writing and returns the future of its reply.
    ///
    /// The command is ordered relative to other submissions at the moment of this
    /// call, not when the returned future is first polled.
    pub fn submit(&self, command: Command) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        if command.is_empty() {
            // Rejected before reaching the connection, which stays usable.
            let _ = tx.send(Err(empty_command()));
            return PendingReply {
                rx,
                shared: self.shared.clone(),
            };
        }
        debug!("Issuing {}", command.name_lossy());
        // A send error means the writer task is gone; the dropped sender then
        // resolves the reply with the recorded failure.
        let _ = self.submit_tx.send(Submission {
            commands: vec![command],
            replies: vec![tx],
        });
        PendingReply {
            rx,
            shared: self.shared.clone(),
        }
    }

    /// Writes `command` and waits for its reply.
    pub async fn issue(&self, command: Command) -> Result<Response> {
        self.submit(command).await
    }

    /// Writes all `commands` back to back in a single flush and returns their
    /// replies in the same order.
    pub async fn issue_all(&self, commands: Vec<Command>) -> Result<Vec<Response>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        if commands.iter().any(Command::is_empty) {
            return Err(empty_command());
        }
        let mut receivers = Vec::with_capacity(commands.len());
        let mut replies = Vec::with_capacity(commands.len());
        for _ in 0..commands.len() {
            let (tx, rx) = oneshot::channel();
            replies.push(tx);
            receivers.push(PendingReply {
                rx,
                shared: self.shared.clone(),
            });
        }
        debug!("Issuing a batch of {} commands", commands.len());
        let _ = self.submit_tx.send(Submission { commands, replies });

        let mut results = Vec::with_capacity(receivers.len());
        for receiver in receivers {
            results.push(receiver.await?);
        }
        Ok(results)
    }

    /// The failure that closed this connection, if any.
    pub fn failure(&self) -> Option<ClientError> {
        self.shared.failure()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.failure().is_some() || self.submit_tx.is_closed()
    }

    /// Flushes outstanding writes, shuts down the write side and stops the reader.
    /// Replies still pending are failed with [`ClientError::ConnectionClosed`].
    pub async fn close(mut self) {
        // Swapping in a dangling sender closes the channel the writer task drains.
        let (closed_tx, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.submit_tx, closed_tx));
        if let Err(e) = (&mut self.writer).await {
            warn!("Writer task ended abnormally: {e}");
        }
        self.reader.abort();
        self.shared.fail(ClientError::ConnectionClosed);
        info!("Connection closed.");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // The writer exits by itself once the channel closes; the reader would wait for EOF.
        self.reader.abort();
    }
}

fn empty_command() -> ClientError {
    ClientError::Protocol("cannot send an empty command".to_string())
}

async fn write_loop<W>(
    mut sink: FramedWrite<WriteHalf<W>, RespCodec>,
    mut submit_rx: mpsc::UnboundedReceiver<Submission>,
    shared: Arc<Shared>,
) where
    W: AsyncWrite,
{
    while let Some(Submission { commands, replies }) = submit_rx.recv().await {
        // Waiters are registered before any byte is written so a fast reply always
        // finds its sender at the head of the queue.
        if shared.register(replies).is_err() {
            continue;
        }
        for command in commands {
            if let Err(e) = sink.feed(command).await {
                warn!("Write to server failed: {e}");
                shared.fail(e);
                return;
            }
        }
        if let Err(e) = SinkExt::<Command>::flush(&mut sink).await {
            warn!("Flush to server failed: {e}");
            shared.fail(e);
            return;
        }
    }

    debug!("Dispatcher handle dropped; shutting down the write side.");
    if let Err(e) = SinkExt::<Command>::close(&mut sink).await {
        debug!("Error while shutting down the write side: {e}");
    }
}

async fn read_loop<R>(mut source: FramedRead<ReadHalf<R>, RespCodec>, shared: Arc<Shared>)
where
    R: AsyncRead,
{
    loop {
        match source.next().await {
            Some(Ok(reply)) => {
                if let Err(reply) = shared.complete_next(reply) {
                    warn!("Received a reply with no command waiting for it: {reply:?}");
                    shared.fail(ClientError::Protocol(
                        "unsolicited reply; connection is out of sync".to_string(),
                    ));
                    return;
                }
            }
            Some(Err(e)) => {
                warn!("Failed to read from server: {e}");
                shared.fail(e);
                return;
            }
            None => {
                info!("Server closed the connection.");
                shared.fail(ClientError::ConnectionClosed);
                return;
            }
        }
    }
}
