// src/core/errors.rs

//! Defines the primary error type for the client.

use std::sync::Arc;
use thiserror::Error;

/// A convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Every failure the client can report.
///
/// A server-side `-ERR ...` reply is *not* represented here: it arrives as
/// [`Response::Error`](crate::core::protocol::Response::Error) like any other reply.
/// The variants below are transport, framing and setup failures only.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// Internal decoder signal; the codec turns it into `Ok(None)`.
    #[error("Incomplete data in stream")]
    IncompleteData,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Timed out while connecting to {0}")]
    ConnectTimeout(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Handshake rejected: {0}")]
    Handshake(String),

    #[error("Command not allowed in the current state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// True for failures that leave the connection unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Protocol(_)
                | ClientError::ConnectionClosed
                | ClientError::Tls(_)
        )
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// A dispatcher failure is fanned out to every pending reply, so it must be cheap to copy.
impl Clone for ClientError {
    fn clone(&self) -> Self {
        match self {
            ClientError::Io(e) => ClientError::Io(Arc::clone(e)),
            ClientError::IncompleteData => ClientError::IncompleteData,
            ClientError::Protocol(s) => ClientError::Protocol(s.clone()),
            ClientError::ConnectionClosed => ClientError::ConnectionClosed,
            ClientError::ConnectTimeout(s) => ClientError::ConnectTimeout(s.clone()),
            ClientError::Tls(s) => ClientError::Tls(s.clone()),
            ClientError::Handshake(s) => ClientError::Handshake(s.clone()),
            ClientError::InvalidState(s) => ClientError::InvalidState(s.clone()),
            ClientError::Config(s) => ClientError::Config(s.clone()),
        }
    }
}

impl PartialEq for ClientError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ClientError::Io(e1), ClientError::Io(e2)) => {
                e1.kind() == e2.kind() && e1.to_string() == e2.to_string()
            }
            (ClientError::Protocol(s1), ClientError::Protocol(s2)) => s1 == s2,
            (ClientError::ConnectTimeout(s1), ClientError::ConnectTimeout(s2)) => s1 == s2,
            (ClientError::Tls(s1), ClientError::Tls(s2)) => s1 == s2,
            (ClientError::Handshake(s1), ClientError::Handshake(s2)) => s1 == s2,
            (ClientError::InvalidState(s1), ClientError::InvalidState(s2)) => s1 == s2,
            (ClientError::Config(s1), ClientError::Config(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(Arc::new(e))
    }
}

impl From<rustls::Error> for ClientError {
    fn from(e: rustls::Error) -> Self {
        ClientError::Tls(e.to_string())
    }
}
