// src/config.rs

//! Client configuration: loading from TOML and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Connection settings for a [`Client`](crate::client::Client).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Sent as the first argument of `AUTH` when set. Requires `password`.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Selected right after connecting when non-zero.
    #[serde(default)]
    pub database: u32,
    /// Bounds the TCP connect and the TLS handshake together.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub tls: TlsConfig,
}

/// Transport security settings.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// PEM bundle of trusted roots. The bundled web PKI roots are used when unset.
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    /// Client certificate for mutual TLS, together with `key_path`.
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
    /// Name used for SNI and certificate verification instead of `host`.
    #[serde(default)]
    pub server_name: Option<String>,
    /// Accept any server certificate. Insecure.
    #[serde(default)]
    pub skip_verification: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7878
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            database: 0,
            connect_timeout: default_connect_timeout(),
            log_level: default_log_level(),
            tls: TlsConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads and validates the configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Parses and validates the configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: ClientConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout cannot be 0"));
        }
        if self.username.is_some() && self.password.is_none() {
            return Err(anyhow!("username is set but password is missing"));
        }
        if self.tls.cert_path.is_some() != self.tls.key_path.is_some() {
            return Err(anyhow!(
                "tls.cert_path and tls.key_path must be set together"
            ));
        }
        if self.tls.skip_verification && !self.tls.enabled {
            warn!("tls.skip_verification has no effect while TLS is disabled.");
        }
        Ok(())
    }

    /// The `host:port` address to connect to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
