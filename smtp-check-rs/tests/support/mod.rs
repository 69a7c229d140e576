//! Scripted SMTP server for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use smtp_check_rs::transport::{BoxedStream, Connector};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{duplex, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

pub const USERNAME: &str = "user@example.com";
pub const PASSWORD: &str = "secret";
pub const FROM: &str = "user@example.com";
pub const TO: &str = "inbox@example.org";

/// Commands received by the server, in order
pub type Transcript = Arc<Mutex<Vec<String>>>;

/// How the fake server answers
#[derive(Debug, Clone)]
pub struct ServerBehavior {
    pub banner: String,
    /// EHLO keywords, e.g. "STARTTLS" or "AUTH PLAIN LOGIN"
    pub extensions: Vec<String>,
    /// Advertise AUTH only once the session is encrypted
    pub auth_requires_tls: bool,
    pub reject_ehlo: bool,
    pub reject_helo: bool,
    pub starttls_reply: String,
    pub sender_reply: String,
    pub recipient_reply: String,
    pub data_reply: String,
    pub end_of_data_reply: String,
    pub noop_reply: String,
    /// Close the connection when this verb arrives
    pub hang_up_on: Option<String>,
    /// Stop answering, but keep the connection open, when this verb arrives
    pub stall_on: Option<String>,
    /// Accept the connection but never say anything
    pub silent: bool,
}

impl Default for ServerBehavior {
    fn default() -> Self {
        Self {
            banner: "220 mx.example.test ESMTP ready".to_string(),
            extensions: vec![
                "PIPELINING".to_string(),
                "SIZE 10240000".to_string(),
                "STARTTLS".to_string(),
                "AUTH PLAIN LOGIN".to_string(),
                "8BITMIME".to_string(),
            ],
            auth_requires_tls: false,
            reject_ehlo: false,
            reject_helo: false,
            starttls_reply: "220 2.0.0 Ready to start TLS".to_string(),
            sender_reply: "250 2.1.0 Ok".to_string(),
            recipient_reply: "250 2.1.5 Ok".to_string(),
            data_reply: "354 End data with <CR><LF>.<CR><LF>".to_string(),
            end_of_data_reply: "250 2.0.0 Ok: queued as 4F2A1".to_string(),
            noop_reply: "250 2.0.0 Ok".to_string(),
            hang_up_on: None,
            stall_on: None,
            silent: false,
        }
    }
}

impl ServerBehavior {
    pub fn without(mut self, keyword: &str) -> Self {
        self.extensions
            .retain(|e| !e.to_ascii_uppercase().starts_with(keyword));
        self
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }
}

enum AuthStep {
    Idle,
    LoginUsername,
    LoginPassword(String),
}

/// Serve one SMTP session on `stream` until QUIT or disconnect
pub async fn serve<S>(stream: S, behavior: ServerBehavior, implicit_tls: bool, transcript: Transcript)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    if behavior.silent {
        drain(&mut reader).await;
        return;
    }

    let mut tls = implicit_tls;
    let mut in_data = false;
    let mut auth = AuthStep::Idle;

    if send(&mut reader, &behavior.banner).await.is_err() {
        return;
    }

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let input = line.trim_end_matches(['\r', '\n']).to_string();

        if in_data {
            if input == "." {
                in_data = false;
                if send(&mut reader, &behavior.end_of_data_reply).await.is_err() {
                    return;
                }
            }
            continue;
        }

        transcript.lock().unwrap().push(input.clone());

        let verb = input
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if behavior.hang_up_on.as_deref() == Some(verb.as_str()) {
            return;
        }
        if behavior.stall_on.as_deref() == Some(verb.as_str()) {
            drain(&mut reader).await;
            return;
        }

        let reply = match std::mem::replace(&mut auth, AuthStep::Idle) {
            AuthStep::LoginUsername => {
                auth = AuthStep::LoginPassword(decode(&input));
                "334 UGFzc3dvcmQ6".to_string()
            }
            AuthStep::LoginPassword(username) => credentials_reply(&username, &decode(&input)),
            AuthStep::Idle => match verb.as_str() {
                "EHLO" if behavior.reject_ehlo => "502 5.5.2 Error: command not recognized".to_string(),
                "EHLO" => ehlo_reply(&behavior, tls),
                "HELO" if behavior.reject_helo => "501 5.5.4 Syntax error".to_string(),
                "HELO" => "250 mx.example.test".to_string(),
                "STARTTLS" => {
                    if behavior.starttls_reply.starts_with("220") {
                        tls = true;
                    }
                    behavior.starttls_reply.clone()
                }
                "AUTH" => {
                    let mut parts = input.split_whitespace().skip(1);
                    match (parts.next().map(str::to_ascii_uppercase).as_deref(), parts.next()) {
                        (Some("PLAIN"), Some(response)) => plain_reply(response),
                        (Some("LOGIN"), None) => {
                            auth = AuthStep::LoginUsername;
                            "334 VXNlcm5hbWU6".to_string()
                        }
                        _ => "504 5.5.4 Unrecognized authentication type".to_string(),
                    }
                }
                "MAIL" => behavior.sender_reply.clone(),
                "RCPT" => behavior.recipient_reply.clone(),
                "DATA" => {
                    in_data = behavior.data_reply.starts_with("354");
                    behavior.data_reply.clone()
                }
                "NOOP" => behavior.noop_reply.clone(),
                "QUIT" => {
                    let _ = send(&mut reader, "221 2.0.0 Bye").await;
                    return;
                }
                _ => "502 5.5.2 Error: command not recognized".to_string(),
            },
        };

        if send(&mut reader, &reply).await.is_err() {
            return;
        }
    }
}

/// Swallow input until the client goes away
async fn drain<S>(reader: &mut BufReader<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut line = String::new();
    while matches!(reader.read_line(&mut line).await, Ok(n) if n > 0) {
        line.clear();
    }
}

fn ehlo_reply(behavior: &ServerBehavior, tls: bool) -> String {
    let extensions: Vec<&String> = behavior
        .extensions
        .iter()
        .filter(|e| !(tls && e.eq_ignore_ascii_case("STARTTLS")))
        .filter(|e| tls || !behavior.auth_requires_tls || !e.to_ascii_uppercase().starts_with("AUTH"))
        .collect();

    let mut lines = vec!["mx.example.test".to_string()];
    lines.extend(extensions.into_iter().cloned());

    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let separator = if i == last { ' ' } else { '-' };
            format!("250{}{}", separator, text)
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}

fn plain_reply(response: &str) -> String {
    let decoded = BASE64.decode(response).unwrap_or_default();
    let decoded = String::from_utf8_lossy(&decoded);
    let mut parts = decoded.split('\0');
    let _authzid = parts.next();
    match (parts.next(), parts.next()) {
        (Some(username), Some(password)) => credentials_reply(username, password),
        _ => "501 5.5.2 Cannot decode response".to_string(),
    }
}

fn credentials_reply(username: &str, password: &str) -> String {
    if username == USERNAME && password == PASSWORD {
        "235 2.7.0 Authentication successful".to_string()
    } else {
        "535 5.7.8 Error: authentication failed".to_string()
    }
}

fn decode(input: &str) -> String {
    let decoded = BASE64.decode(input.trim()).unwrap_or_default();
    String::from_utf8_lossy(&decoded).to_string()
}

async fn send<S>(reader: &mut BufReader<S>, reply: &str) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let stream = reader.get_mut();
    stream.write_all(format!("{}\r\n", reply).as_bytes()).await?;
    stream.flush().await
}

/// In-memory connector: every connect spawns a fresh scripted server
pub struct FakeConnector {
    behavior: ServerBehavior,
    pub refuse: bool,
    pub fail_upgrade: bool,
    pub connects: AtomicUsize,
    pub upgrades: AtomicUsize,
    pub transcript: Transcript,
}

impl FakeConnector {
    pub fn new(behavior: ServerBehavior) -> Self {
        Self {
            behavior,
            refuse: false,
            fail_upgrade: false,
            connects: AtomicUsize::new(0),
            upgrades: AtomicUsize::new(0),
            transcript: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new(ServerBehavior::default())
        }
    }

    pub fn failing_upgrade(behavior: ServerBehavior) -> Self {
        Self {
            fail_upgrade: true,
            ..Self::new(behavior)
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn upgrades(&self) -> usize {
        self.upgrades.load(Ordering::SeqCst)
    }

    /// Verbs received across all sessions, uppercased
    pub fn verbs(&self) -> Vec<String> {
        self.transcript
            .lock()
            .unwrap()
            .iter()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_ascii_uppercase)
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.transcript.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _host: &str, _port: u16, implicit_tls: bool) -> io::Result<BoxedStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "Connection refused (os error 111)",
            ));
        }

        let (client, server) = duplex(64 * 1024);
        tokio::spawn(serve(
            server,
            self.behavior.clone(),
            implicit_tls,
            self.transcript.clone(),
        ));
        Ok(Box::new(client))
    }

    async fn starttls(&self, _host: &str, stream: BoxedStream) -> io::Result<BoxedStream> {
        self.upgrades.fetch_add(1, Ordering::SeqCst);
        if self.fail_upgrade {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid peer certificate: UnknownIssuer",
            ));
        }
        Ok(stream)
    }
}
