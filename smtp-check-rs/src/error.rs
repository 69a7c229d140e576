//! Error types for smtp-check-rs
//!
//! Three layers of errors live here:
//! - [`SmtpError`]: transport-level failures of the SMTP client (I/O,
//!   timeouts, disconnects, unparseable replies)
//! - [`ProbeError`]: the classified outcome of a failed probe, one variant
//!   per [`ErrorKind`]
//! - [`ServiceError`]: startup failures of the service itself

use crate::smtp::Reply;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for service setup
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Stable, machine-readable classification of a failed probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RequestInvalid,
    ConnectionFailed,
    HeloError,
    #[serde(rename = "starttls_unsupported")]
    StartTlsUnsupported,
    #[serde(rename = "tls_upgrade_failed")]
    TlsUpgradeFailed,
    AuthFailed,
    SenderRefused,
    RecipientRefused,
    DataError,
    NetworkError,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RequestInvalid => "request_invalid",
            ErrorKind::ConnectionFailed => "connection_failed",
            ErrorKind::HeloError => "helo_error",
            ErrorKind::StartTlsUnsupported => "starttls_unsupported",
            ErrorKind::TlsUpgradeFailed => "tls_upgrade_failed",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::SenderRefused => "sender_refused",
            ErrorKind::RecipientRefused => "recipient_refused",
            ErrorKind::DataError => "data_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a probe failed, with the data specific to that failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    /// The request was rejected before any network I/O
    #[error("{0}")]
    RequestInvalid(String),

    /// TCP connect, DNS, implicit TLS handshake or banner failed
    #[error("Could not connect to {target}: {reason}")]
    ConnectionFailed {
        target: String,
        reason: String,
        reply: Option<Reply>,
    },

    /// Both EHLO and HELO were rejected
    #[error("Server rejected greeting: {reply}")]
    HeloError { reply: Reply },

    /// STARTTLS was requested but the server does not advertise it
    #[error("STARTTLS requested but not supported by server")]
    StartTlsUnsupported,

    /// STARTTLS was advertised but the upgrade did not complete
    #[error("STARTTLS upgrade failed: {reason}")]
    TlsUpgradeFailed {
        reason: String,
        reply: Option<Reply>,
    },

    #[error("Authentication failed: {reason}")]
    AuthFailed {
        reason: String,
        reply: Option<Reply>,
    },

    #[error("Sender address <{sender}> refused: {reply}")]
    SenderRefused { sender: String, reply: Reply },

    /// Every recipient was refused; keyed by address
    #[error("Recipient address refused: {}", join_addresses(.recipients))]
    RecipientRefused { recipients: BTreeMap<String, Reply> },

    #[error("Message data rejected: {reply}")]
    DataError { reply: Reply },

    /// Mid-session socket failure, timeout or protocol breakdown
    #[error("Network error: {reason}")]
    Network {
        reason: String,
        reply: Option<Reply>,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

fn join_addresses(recipients: &BTreeMap<String, Reply>) -> String {
    recipients.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
}

impl ProbeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::RequestInvalid(_) => ErrorKind::RequestInvalid,
            ProbeError::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            ProbeError::HeloError { .. } => ErrorKind::HeloError,
            ProbeError::StartTlsUnsupported => ErrorKind::StartTlsUnsupported,
            ProbeError::TlsUpgradeFailed { .. } => ErrorKind::TlsUpgradeFailed,
            ProbeError::AuthFailed { .. } => ErrorKind::AuthFailed,
            ProbeError::SenderRefused { .. } => ErrorKind::SenderRefused,
            ProbeError::RecipientRefused { .. } => ErrorKind::RecipientRefused,
            ProbeError::DataError { .. } => ErrorKind::DataError,
            ProbeError::Network { .. } => ErrorKind::NetworkError,
            ProbeError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// The server reply that caused the failure, if there was one
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            ProbeError::ConnectionFailed { reply, .. }
            | ProbeError::TlsUpgradeFailed { reply, .. }
            | ProbeError::AuthFailed { reply, .. }
            | ProbeError::Network { reply, .. } => reply.as_ref(),
            ProbeError::HeloError { reply }
            | ProbeError::SenderRefused { reply, .. }
            | ProbeError::DataError { reply } => Some(reply),
            _ => None,
        }
    }

    /// Free-text cause for kinds that are not fully described by a reply
    pub fn reason(&self) -> Option<&str> {
        match self {
            ProbeError::ConnectionFailed { reason, .. }
            | ProbeError::TlsUpgradeFailed { reason, .. }
            | ProbeError::AuthFailed { reason, .. }
            | ProbeError::Network { reason, .. } => Some(reason.as_str()),
            ProbeError::Unexpected(reason) => Some(reason.as_str()),
            _ => None,
        }
    }

    pub fn recipients(&self) -> Option<&BTreeMap<String, Reply>> {
        match self {
            ProbeError::RecipientRefused { recipients } => Some(recipients),
            _ => None,
        }
    }
}

/// A transport-level failure makes the rest of the session unusable
impl From<SmtpError> for ProbeError {
    fn from(err: SmtpError) -> Self {
        ProbeError::Network {
            reason: err.to_string(),
            reply: None,
        }
    }
}

/// SMTP client errors that are not a server reply
#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Connection closed by server")]
    Closed,

    #[error("Malformed reply: {0}")]
    Malformed(String),
}

/// Service startup errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TLS error: {0}")]
    Tls(String),
}

impl From<config::ConfigError> for ServiceError {
    fn from(err: config::ConfigError) -> Self {
        ServiceError::Config(err.to_string())
    }
}
