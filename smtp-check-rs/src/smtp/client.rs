//! SMTP client session
//!
//! Drives the client side of one SMTP conversation over any byte stream.
//! Every read and write is bounded by the session timeout.
//!
//! # Security
//! - AUTH payloads are never written to the log
//! - Reply lines are length-checked

use crate::error::SmtpError;
use crate::smtp::message::encode_data;
use crate::smtp::reply::{self, Reply};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::debug;

/// Maximum accepted length of a single reply line
const MAX_LINE_LENGTH: usize = 4096;

/// Maximum number of lines in one reply
const MAX_REPLY_LINES: usize = 128;

/// Client side of an SMTP session
///
/// The stream is owned by the client and closed when the client is
/// dropped.
///
/// # Examples
/// ```no_run
/// use smtp_check_rs::smtp::SmtpClient;
/// use std::time::Duration;
/// use tokio::net::TcpStream;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = TcpStream::connect("mail.example.com:587").await?;
/// let mut client = SmtpClient::new(stream, Duration::from_secs(10));
/// let banner = client.read_reply().await?;
/// let ehlo = client.command("EHLO probe.example.com").await?;
/// client.quit().await;
/// # Ok(())
/// # }
/// ```
pub struct SmtpClient<S> {
    reader: BufReader<S>,
    timeout: Duration,
}

impl<S> SmtpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self {
            reader: BufReader::new(stream),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a command line and wait for the reply
    pub async fn command(&mut self, line: &str) -> Result<Reply, SmtpError> {
        debug!("> {}", redact(line));
        self.write_line(line).await?;
        self.read_reply().await
    }

    /// Like [`command`](Self::command), but the line is not logged
    pub async fn send_secret(&mut self, line: &str) -> Result<Reply, SmtpError> {
        debug!("> <redacted>");
        self.write_line(line).await?;
        self.read_reply().await
    }

    /// Transmit message content after a 354 and read the final reply
    pub async fn send_data(&mut self, message: &[u8]) -> Result<Reply, SmtpError> {
        let payload = encode_data(message);
        debug!("> <{} bytes of message data>", payload.len());
        self.write_all(&payload).await?;
        self.read_reply().await
    }

    /// Read a complete, possibly multi-line, reply
    pub async fn read_reply(&mut self) -> Result<Reply, SmtpError> {
        let raw = self.read_line().await?;
        let first = reply::parse_line(&raw)?;
        let code = first.code;
        let mut last = first.last;
        let mut lines = vec![first.text.to_string()];

        while !last {
            if lines.len() >= MAX_REPLY_LINES {
                return Err(SmtpError::Malformed(format!(
                    "reply exceeds {} lines",
                    MAX_REPLY_LINES
                )));
            }

            let raw = self.read_line().await?;
            let line = reply::parse_line(&raw)?;
            if line.code != code {
                return Err(SmtpError::Malformed(format!(
                    "reply code changed from {} to {} mid-reply",
                    code, line.code
                )));
            }
            last = line.last;
            lines.push(line.text.to_string());
        }

        let reply = Reply::new(code, lines);
        debug!("< {}", reply);
        Ok(reply)
    }

    /// Send QUIT and shut the stream down, ignoring failures
    pub async fn quit(&mut self) {
        match self.command("QUIT").await {
            Ok(reply) => debug!("QUIT answered with {}", reply.code),
            Err(e) => debug!("QUIT failed: {}", e),
        }

        let limit = self.timeout;
        if let Ok(Err(e)) = timeout(limit, self.reader.get_mut().shutdown()).await {
            debug!("Shutdown failed: {}", e);
        }
    }

    /// Give back the underlying stream, e.g. to wrap it in TLS.
    ///
    /// Buffered but unread input is discarded; after a 220 to STARTTLS the
    /// server must not have sent anything else.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    async fn read_line(&mut self) -> Result<String, SmtpError> {
        let limit = self.timeout;
        timeout(limit, self.read_bounded_line())
            .await
            .map_err(|_| SmtpError::Timeout(limit))?
    }

    /// Read up to and including `\n`, failing as soon as the line outgrows
    /// `MAX_LINE_LENGTH` instead of buffering it first
    async fn read_bounded_line(&mut self) -> Result<String, SmtpError> {
        let mut line = Vec::new();

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if line.is_empty() {
                    return Err(SmtpError::Closed);
                }
                break;
            }

            let (take, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (end + 1, true),
                None => (available.len(), false),
            };
            if line.len() + take > MAX_LINE_LENGTH {
                return Err(SmtpError::Malformed(format!(
                    "reply line exceeds {} bytes",
                    MAX_LINE_LENGTH
                )));
            }

            line.extend_from_slice(&available[..take]);
            self.reader.consume(take);
            if complete {
                break;
            }
        }

        String::from_utf8(line)
            .map_err(|_| SmtpError::Malformed("reply line is not valid UTF-8".to_string()))
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SmtpError> {
        self.write_all(format!("{}\r\n", line).as_bytes()).await
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), SmtpError> {
        let limit = self.timeout;
        let stream = self.reader.get_mut();

        timeout(limit, stream.write_all(bytes))
            .await
            .map_err(|_| SmtpError::Timeout(limit))??;
        timeout(limit, stream.flush())
            .await
            .map_err(|_| SmtpError::Timeout(limit))??;

        Ok(())
    }
}

/// Keep AUTH payloads out of the log
fn redact(line: &str) -> String {
    let mut parts = line.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(verb), Some(mechanism), Some(_)) if verb.eq_ignore_ascii_case("AUTH") => {
            format!("{} {} <redacted>", verb, mechanism)
        }
        _ => line.to_string(),
    }
}

/// Name announced in EHLO/HELO when the caller does not provide one
pub fn default_helo_name() -> String {
    let hostname = gethostname::gethostname().to_string_lossy().to_string();
    let valid = !hostname.is_empty()
        && hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');

    if valid {
        hostname
    } else {
        "localhost".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    fn client_pair() -> (SmtpClient<DuplexStream>, DuplexStream) {
        let (client, server) = duplex(8 * 1024);
        (SmtpClient::new(client, Duration::from_secs(5)), server)
    }

    #[tokio::test]
    async fn test_read_multiline_reply() {
        let (mut client, mut server) = client_pair();
        server
            .write_all(b"250-mail.example.com\r\n250-STARTTLS\r\n250 AUTH PLAIN\r\n")
            .await
            .unwrap();

        let reply = client.read_reply().await.unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines, vec!["mail.example.com", "STARTTLS", "AUTH PLAIN"]);
    }

    #[tokio::test]
    async fn test_command_writes_crlf_line() {
        let (mut client, mut server) = client_pair();
        server.write_all(b"250 2.0.0 Ok\r\n").await.unwrap();

        let reply = client.command("NOOP").await.unwrap();
        assert_eq!(reply.code, 250);

        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"NOOP\r\n");
    }

    #[tokio::test]
    async fn test_send_data_terminates_message() {
        let (mut client, mut server) = client_pair();
        server.write_all(b"250 2.0.0 queued\r\n").await.unwrap();

        let reply = client.send_data(b"Subject: hi\r\n\r\n.line").await.unwrap();
        assert!(reply.is_positive());

        let expected = b"Subject: hi\r\n\r\n..line\r\n.\r\n";
        let mut buf = vec![0u8; expected.len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, expected.to_vec());
    }

    #[tokio::test]
    async fn test_inconsistent_codes_are_malformed() {
        let (mut client, mut server) = client_pair();
        server.write_all(b"250-first\r\n251 second\r\n").await.unwrap();

        let err = client.read_reply().await.unwrap_err();
        assert!(matches!(err, SmtpError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let (mut client, server) = client_pair();
        drop(server);

        let err = client.read_reply().await.unwrap_err();
        assert!(matches!(err, SmtpError::Closed));
    }

    #[tokio::test]
    async fn test_read_times_out() {
        let (client, _server) = duplex(1024);
        let mut client = SmtpClient::new(client, Duration::from_millis(50));

        let err = client.read_reply().await.unwrap_err();
        assert!(matches!(err, SmtpError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_overlong_line_rejected_without_buffering_it() {
        const STREAMED: usize = 4 * 1024 * 1024;
        let (client, mut server) = duplex(4 * 1024);
        let mut client = SmtpClient::new(client, Duration::from_secs(5));

        let writer = tokio::spawn(async move {
            let chunk = [b'x'; 1024];
            let mut written = 0;
            while written < STREAMED {
                if server.write_all(&chunk).await.is_err() {
                    break;
                }
                written += chunk.len();
            }
            written
        });

        let err = client.read_reply().await.unwrap_err();
        assert!(matches!(err, SmtpError::Malformed(_)));
        drop(client);

        let written = writer.await.unwrap();
        assert!(written < 64 * 1024, "server pushed {} bytes", written);
    }

    #[tokio::test]
    async fn test_line_at_length_limit_is_accepted() {
        let (mut client, mut server) = client_pair();
        let text = "x".repeat(MAX_LINE_LENGTH - 6);
        server
            .write_all(format!("250 {}\r\n", text).as_bytes())
            .await
            .unwrap();

        let reply = client.read_reply().await.unwrap();
        assert_eq!(reply.lines, vec![text]);
    }

    #[test]
    fn test_redact_auth() {
        assert_eq!(redact("AUTH PLAIN AHVzZXIAcGFzcw=="), "AUTH PLAIN <redacted>");
        assert_eq!(redact("AUTH LOGIN"), "AUTH LOGIN");
        assert_eq!(redact("MAIL FROM:<a@b.c>"), "MAIL FROM:<a@b.c>");
    }

    #[test]
    fn test_default_helo_name_is_usable() {
        let name = default_helo_name();
        assert!(!name.is_empty());
        assert!(!name.contains(char::is_whitespace));
    }
}
