// src/connection/mod.rs

//! Everything that touches the transport: the stream type, TLS negotiation and
//! the dispatcher that owns a connection.

pub mod dispatcher;
pub mod stream;
pub mod tls;

pub use dispatcher::{Dispatcher, PendingReply};
pub use stream::ClientStream;
