// src/connection/tls.rs

//! Client-side TLS: root store, optional client certificate and the handshake.

use crate::config::TlsConfig;
use crate::core::{ClientError, Result};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::{self, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;
use tracing::{info, warn};

/// Builds the rustls client configuration described by `tls`.
pub fn build_client_config(tls: &TlsConfig) -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;

    let builder = if tls.skip_verification {
        warn!("TLS certificate verification is disabled; the server's identity is not checked.");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
    } else {
        builder.with_root_certificates(load_root_store(tls)?)
    };

    match (&tls.cert_path, &tls.key_path) {
        (Some(cert_path), Some(key_path)) => {
            info!("Presenting client certificate from '{cert_path}'.");
            Ok(builder.with_client_auth_cert(load_certs(cert_path)?, load_key(key_path)?)?)
        }
        _ => Ok(builder.with_no_client_auth()),
    }
}

/// Performs the TLS handshake over an established TCP stream.
///
/// The certificate is checked against `tls.server_name` when set, otherwise
/// against `host`.
pub async fn connect(tcp: TcpStream, host: &str, tls: &TlsConfig) -> Result<TlsStream<TcpStream>> {
    let connector = TlsConnector::from(Arc::new(build_client_config(tls)?));
    let name = tls.server_name.as_deref().unwrap_or(host);
    let domain = ServerName::try_from(name)
        .map_err(|_| ClientError::Tls(format!("invalid server name '{name}'")))?
        .to_owned();

    connector
        .connect(domain, tcp)
        .await
        .map_err(|e| ClientError::Tls(format!("handshake with '{name}' failed: {e}")))
}

fn load_root_store(tls: &TlsConfig) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    match &tls.ca_cert_path {
        Some(path) => {
            for cert in load_certs(path)? {
                roots.add(cert)?;
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(roots)
}

/// Loads certificates from a PEM file.
fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        ClientError::Config(format!("failed to open certificate file '{path}': {e}"))
    })?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader).collect::<std::io::Result<Vec<_>>>()?;
    if certs.is_empty() {
        return Err(ClientError::Config(format!("no certificates found in '{path}'")));
    }
    Ok(certs)
}

/// Loads a private key from a PEM file.
fn load_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        ClientError::Config(format!("failed to open private key file '{path}': {e}"))
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| ClientError::Config(format!("no private key found in '{path}'")))
}

/// Accepts any server certificate. Handshake signatures are still verified, so
/// the peer must hold the key of the certificate it presents.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
