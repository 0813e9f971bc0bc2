// src/client.rs

//! The public entry point: one [`Client`] per server connection.

use crate::config::ClientConfig;
use crate::connection::{ClientStream, Dispatcher, PendingReply, tls};
use crate::core::commands::generic;
use crate::core::protocol::{Command, Response, ToArg};
use crate::core::transaction::Transaction;
use crate::core::{ClientError, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

/// A connection to a server.
///
/// Methods take `&mut self`: a client serves one caller at a time, and a
/// [`Transaction`] keeps it borrowed from `MULTI` to `EXEC`. Use several clients
/// for concurrent work.
pub struct Client {
    dispatcher: Dispatcher,
    peer: String,
}

impl Client {
    /// Connects, negotiates TLS if enabled and runs the `AUTH`/`SELECT` handshake.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ClientError::Config(format!("{e:#}")))?;

        let addr = config.address();
        info!("Connecting to {addr}");
        let stream = timeout(config.connect_timeout, open_stream(config, &addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout(addr.clone()))??;

        let transport = if stream.is_tls() { "TLS" } else { "plain TCP" };
        let mut client = Self::with_peer(stream, addr);
        client.handshake(config).await?;
        info!("Connected to {} over {transport}", client.peer);
        Ok(client)
    }

    /// Wraps an already established stream. No handshake is performed.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_peer(stream, "<stream>".to_string())
    }

    fn with_peer<S>(stream: S, peer: String) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self {
            dispatcher: Dispatcher::new(stream),
            peer,
        }
    }

    async fn handshake(&mut self, config: &ClientConfig) -> Result<()> {
        if let Some(password) = &config.password {
            let reply = self
                .issue(generic::auth(config.username.as_deref(), password))
                .await?;
            if !reply.is_ok() {
                return Err(ClientError::Handshake(format!("AUTH: {reply}")));
            }
            debug!("Authenticated with {}", self.peer);
        }
        if config.database != 0 {
            let reply = self.issue(generic::select(config.database)).await?;
            if !reply.is_ok() {
                return Err(ClientError::Handshake(format!(
                    "SELECT {}: {reply}",
                    config.database
                )));
            }
            debug!("Selected database {}", config.database);
        }
        Ok(())
    }

    /// The address this client connected to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Sends one command and waits for its reply.
    ///
    /// A server error is an `Ok(Response::Error(..))`; `Err` means the connection failed.
    pub async fn issue(&mut self, command: impl Into<Command>) -> Result<Response> {
        self.dispatcher.issue(command.into()).await
    }

    /// Pipelines `commands` in one write and returns their replies in order.
    pub async fn issue_all(&mut self, commands: Vec<Command>) -> Result<Vec<Response>> {
        self.dispatcher.issue_all(commands).await
    }

    /// Queues a command without waiting. Several submitted commands are pipelined.
    pub fn submit(&mut self, command: impl Into<Command>) -> PendingReply {
        self.dispatcher.submit(command.into())
    }

    pub async fn ping(&mut self) -> Result<Response> {
        self.issue(generic::ping()).await
    }

    pub async fn watch<I, K>(&mut self, keys: I) -> Result<Response>
    where
        I: IntoIterator<Item = K>,
        K: ToArg,
    {
        self.issue(generic::watch(keys)).await
    }

    pub async fn unwatch(&mut self) -> Result<Response> {
        self.issue(generic::unwatch()).await
    }

    /// Starts building a `MULTI`/`EXEC` transaction on this connection.
    pub fn begin_transaction(&mut self) -> Transaction<'_> {
        Transaction::new(self)
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }

    /// The failure that closed the connection, if any.
    pub fn failure(&self) -> Option<ClientError> {
        self.dispatcher.failure()
    }

    /// Flushes pending writes and closes the connection.
    pub async fn close(self) {
        info!("Closing connection to {}", self.peer);
        self.dispatcher.close().await;
    }
}

async fn open_stream(config: &ClientConfig, addr: &str) -> Result<ClientStream> {
    let tcp = TcpStream::connect(addr).await?;
    tcp.set_nodelay(true)?;
    if !config.tls.enabled {
        return Ok(ClientStream::Tcp(tcp));
    }
    info!("Establishing TLS connection with {addr}");
    let tls_stream = tls::connect(tcp, &config.host, &config.tls).await?;
    Ok(ClientStream::Tls(Box::new(tls_stream)))
}
