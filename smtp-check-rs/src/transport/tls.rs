//! TLS client context
//!
//! Certificates are verified against the operating system trust store,
//! with the SMTP host name as SNI and verification name.
//!
//! # Security
//! - TLS 1.2+ only (rustls safe defaults)
//! - No way to disable certificate verification

use crate::error::{Result, ServiceError};
use rustls::{ClientConfig, RootCertStore, ServerName};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// Shared TLS client configuration
#[derive(Clone)]
pub struct TlsClient {
    client_config: Arc<ClientConfig>,
}

impl TlsClient {
    /// Trust the certificates of the operating system store
    pub fn with_native_roots() -> Result<Self> {
        let certs = rustls_native_certs::load_native_certs().map_err(|e| {
            ServiceError::Tls(format!("Failed to load system certificates: {}", e))
        })?;

        let ders: Vec<Vec<u8>> = certs.into_iter().map(|cert| cert.0).collect();
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(&ders);

        if added == 0 {
            warn!("No usable system root certificates found; TLS verification will fail");
        } else {
            info!("Loaded {} system root certificate(s)", added);
        }
        if ignored > 0 {
            debug!("Ignored {} unparsable system certificate(s)", ignored);
        }

        Ok(Self::with_roots(roots))
    }

    /// Trust exactly the given roots
    pub fn with_roots(roots: RootCertStore) -> Self {
        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self::from_config(config)
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            client_config: Arc::new(config),
        }
    }

    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.client_config.clone())
    }

    /// Run the client handshake over `stream`, verifying the certificate
    /// for `host`
    pub async fn connect<IO>(&self, host: &str, stream: IO) -> io::Result<TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let server_name = server_name(host)?;
        self.connector().connect(server_name, stream).await
    }
}

/// Host name or IP literal to verify the certificate against
fn server_name(host: &str) -> io::Result<ServerName> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(host).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid TLS server name '{}': {}", host, e),
        )
    })
}
