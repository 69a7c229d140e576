//! Probe outcome and progress record

use crate::error::{ErrorKind, ProbeError};
use crate::probe::request::ProbeRequest;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// How far the protocol sequence got. Each flag flips only after its step
/// completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeDetails {
    pub server: String,
    pub port: u16,
    pub used_ssl: bool,
    pub used_starttls: bool,
    pub authenticated: bool,
    pub sent: bool,
}

impl ProbeDetails {
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
            ..Self::default()
        }
    }

    pub fn for_request(request: &ProbeRequest) -> Self {
        Self::new(request.server.clone(), request.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Pass,
    Fail,
}

/// Final result of one probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    pub message: String,
    pub details: ProbeDetails,
    /// Set exactly when `status` is [`ProbeStatus::Fail`]
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    pub fn pass(message: impl Into<String>, details: ProbeDetails) -> Self {
        Self {
            status: ProbeStatus::Pass,
            message: message.into(),
            details,
            error: None,
        }
    }

    pub fn fail(error: ProbeError, details: ProbeDetails) -> Self {
        Self {
            status: ProbeStatus::Fail,
            message: error.to_string(),
            details,
            error: Some(error),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == ProbeStatus::Pass
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(ProbeError::kind)
    }
}

/// Per-recipient outcome on the wire
#[derive(Serialize)]
struct RecipientOutcome {
    code: u16,
    message: String,
}

/// JSON shape of a result: common fields plus the failure payload
#[derive(Serialize)]
struct WireResult<'a> {
    status: ProbeStatus,
    message: &'a str,
    details: &'a ProbeDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    smtp_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    smtp_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipients: Option<BTreeMap<&'a str, RecipientOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

impl Serialize for ProbeResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let error = self.error.as_ref();
        let reply = error.and_then(ProbeError::reply);

        let wire = WireResult {
            status: self.status,
            message: &self.message,
            details: &self.details,
            error_kind: error.map(ProbeError::kind),
            smtp_code: reply.map(|r| r.code),
            smtp_error: reply.map(|r| r.message()),
            sender: match error {
                Some(ProbeError::SenderRefused { sender, .. }) => Some(sender.as_str()),
                _ => None,
            },
            recipients: error.and_then(ProbeError::recipients).map(|recipients| {
                recipients
                    .iter()
                    .map(|(address, reply)| {
                        (
                            address.as_str(),
                            RecipientOutcome {
                                code: reply.code,
                                message: reply.message(),
                            },
                        )
                    })
                    .collect()
            }),
            reason: error.and_then(ProbeError::reason),
        };

        wire.serialize(serializer)
    }
}
