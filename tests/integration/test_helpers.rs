// tests/integration/test_helpers.rs

//! An in-memory server for exercising the client without a network.
//!
//! The client end of a `tokio::io::duplex` pipe is handed to the code under test;
//! the [`MockServer`] end decodes the commands it receives with the crate's own
//! codec and writes scripted replies back, whole or in arbitrary chunks.

#![allow(dead_code)]

use bytes::Bytes;
use futures::StreamExt;
use spineldb_client::Client;
use spineldb_client::connection::Dispatcher;
use spineldb_client::core::{RespCodec, Response};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf, split};
use tokio::task::JoinHandle;
use tokio_util::codec::{Encoder, FramedRead};
use tracing_subscriber::EnvFilter;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Installs a quiet subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_test_writer()
        .try_init();
}

/// The server side of a connection, in memory by default.
pub struct MockServer<S = DuplexStream> {
    commands: FramedRead<ReadHalf<S>, RespCodec>,
    writer: WriteHalf<S>,
}

/// A client and the mock server it is connected to.
pub fn client_pair() -> (Client, MockServer) {
    init_tracing();
    let (client_end, server_end) = tokio::io::duplex(PIPE_CAPACITY);
    (Client::from_stream(client_end), MockServer::new(server_end))
}

/// A bare dispatcher and the mock server it is connected to.
pub fn dispatcher_pair() -> (Dispatcher, MockServer) {
    init_tracing();
    let (client_end, server_end) = tokio::io::duplex(PIPE_CAPACITY);
    (Dispatcher::new(client_end), MockServer::new(server_end))
}

impl<S: AsyncRead + AsyncWrite> MockServer<S> {
    pub fn new(stream: S) -> Self {
        let (read_half, writer) = split(stream);
        Self {
            commands: FramedRead::new(read_half, RespCodec::new()),
            writer,
        }
    }

    /// Waits for the next command and returns its parts as text.
    /// `None` once the client has closed its write side.
    pub async fn next_command(&mut self) -> Option<Vec<String>> {
        let frame = self.commands.next().await?.expect("client sent a malformed command");
        let parts = frame
            .into_array()
            .expect("a command is a non-nil array")
            .into_iter()
            .map(|part| {
                let bytes: Bytes = part.into_bytes().expect("command parts are bulk strings");
                String::from_utf8_lossy(&bytes).into_owned()
            })
            .collect();
        Some(parts)
    }

    /// Asserts that the next command is exactly `expected`.
    pub async fn expect_command(&mut self, expected: &[&str]) {
        let received = self
            .next_command()
            .await
            .unwrap_or_else(|| panic!("connection closed while waiting for {expected:?}"));
        assert_eq!(received, expected, "unexpected command");
    }

    /// Asserts that no command arrives within a short grace period.
    pub async fn expect_silence(&mut self) {
        match tokio::time::timeout(Duration::from_millis(100), self.commands.next()).await {
            Err(_) | Ok(None) => {}
            Ok(Some(frame)) => panic!("expected no further commands, got {frame:?}"),
        }
    }

    pub async fn reply(&mut self, response: Response) {
        let mut buf = bytes::BytesMut::new();
        RespCodec::new()
            .encode(response, &mut buf)
            .expect("responses always encode");
        self.reply_raw(&buf).await;
    }

    pub async fn reply_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("client went away");
        self.writer.flush().await.expect("client went away");
    }

    /// Writes `bytes` in pieces of at most `chunk` bytes, yielding in between so
    /// the client observes partial frames.
    pub async fn reply_chunked(&mut self, bytes: &[u8], chunk: usize) {
        for piece in bytes.chunks(chunk.max(1)) {
            self.reply_raw(piece).await;
            tokio::task::yield_now().await;
        }
    }

    /// Closes the connection from the server side.
    pub async fn hang_up(mut self) {
        let _ = self.writer.shutdown().await;
    }
}

/// One scripted exchange: the command the server expects and what it answers.
pub type Exchange = (Vec<&'static str>, Response);

/// Plays `script` on a background task and hands the server back when done.
pub fn serve<S>(mut server: MockServer<S>, script: Vec<Exchange>) -> JoinHandle<MockServer<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    tokio::spawn(async move {
        for (expected, response) in script {
            server.expect_command(&expected).await;
            server.reply(response).await;
        }
        server
    })
}

pub fn status(s: &str) -> Response {
    Response::Status(s.to_string())
}

pub fn error(s: &str) -> Response {
    Response::Error(s.to_string())
}

pub fn bulk(s: &str) -> Response {
    Response::bulk(Bytes::copy_from_slice(s.as_bytes()))
}
