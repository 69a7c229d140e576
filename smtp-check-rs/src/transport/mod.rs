//! Network transport for probes
//!
//! The probe engine never opens sockets itself; it asks a [`Connector`]
//! for a stream. [`TcpConnector`] is the real implementation (tokio TCP
//! plus rustls), tests substitute in-memory fakes.

pub mod tls;

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

pub use tls::TlsClient;

/// Any bidirectional byte stream a probe can run over
pub trait ProbeStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ProbeStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Boxed stream, plain or encrypted
pub type BoxedStream = Box<dyn ProbeStream>;

/// Opens connections to SMTP servers
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `host:port`, wrapping the socket in TLS first when
    /// `implicit_tls` is set (SMTPS, port 465)
    async fn connect(&self, host: &str, port: u16, implicit_tls: bool) -> io::Result<BoxedStream>;

    /// Perform the TLS handshake on an established plaintext stream after
    /// the server accepted STARTTLS
    async fn starttls(&self, host: &str, stream: BoxedStream) -> io::Result<BoxedStream>;
}

/// TCP connector with rustls for implicit TLS and STARTTLS
#[derive(Clone)]
pub struct TcpConnector {
    tls: TlsClient,
}

impl TcpConnector {
    pub fn new(tls: TlsClient) -> Self {
        Self { tls }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16, implicit_tls: bool) -> io::Result<BoxedStream> {
        let tcp = TcpStream::connect((host, port)).await?;
        tcp.set_nodelay(true)?;
        debug!("TCP connection established to {}:{}", host, port);

        if implicit_tls {
            let stream = self.tls.connect(host, tcp).await?;
            debug!("TLS handshake completed with {}", host);
            Ok(Box::new(stream))
        } else {
            Ok(Box::new(tcp))
        }
    }

    async fn starttls(&self, host: &str, stream: BoxedStream) -> io::Result<BoxedStream> {
        let stream = self.tls.connect(host, stream).await?;
        debug!("STARTTLS handshake completed with {}", host);
        Ok(Box::new(stream))
    }
}
