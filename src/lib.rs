// src/lib.rs

//! An async client for SpinelDB and other RESP-speaking key-value servers.

pub mod client;
pub mod config;
pub mod connection;
pub mod core;

pub use crate::client::Client;
pub use crate::config::{ClientConfig, TlsConfig};
pub use crate::core::{ClientError, Command, Response, Result, Transaction};
