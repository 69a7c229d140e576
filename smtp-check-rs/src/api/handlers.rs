//! API request handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::error::{ErrorKind, ProbeError};
use crate::probe::request::DEFAULT_PORT;
use crate::probe::{ProbeDetails, ProbeRequest, ProbeResult, SmtpProber};

/// Shared application state
pub struct AppState {
    pub prober: SmtpProber,
}

/// `smtp_port` as sent by clients: a JSON number or a numeric string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

impl PortValue {
    fn to_port(&self) -> Option<u16> {
        let value = match self {
            PortValue::Number(n) => *n,
            PortValue::Text(s) => s.trim().parse().ok()?,
        };
        u16::try_from(value).ok().filter(|port| *port != 0)
    }
}

/// Body of `POST /check-smtp`
#[derive(Debug, Default, Deserialize)]
pub struct CheckRequest {
    pub smtp_server: Option<String>,
    pub smtp_port: Option<PortValue>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: Option<String>,
    pub to_email: Option<String>,
    pub send_email: Option<bool>,
    pub use_ssl: Option<bool>,
    pub starttls: Option<bool>,
    /// Seconds; fractions allowed
    pub timeout: Option<f64>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub helo_name: Option<String>,
}

impl CheckRequest {
    /// Apply defaults and the checks that need the raw JSON values.
    ///
    /// Empty strings count as absent, except for the password.
    pub fn into_probe_request(self) -> Result<ProbeRequest, ProbeResult> {
        let server = self.smtp_server.unwrap_or_default().trim().to_string();

        let port = match &self.smtp_port {
            None => DEFAULT_PORT,
            Some(value) => value.to_port().ok_or_else(|| {
                rejected(
                    "smtp_port must be an integer between 1 and 65535",
                    ProbeDetails::new(server.clone(), DEFAULT_PORT),
                )
            })?,
        };

        let mut builder = ProbeRequest::builder(server.clone())
            .port(port)
            .username(non_empty(self.username))
            .password(self.password)
            .from_address(non_empty(self.from_email))
            .to_address(non_empty(self.to_email));

        if let Some(send_email) = self.send_email {
            builder = builder.send_email(send_email);
        }
        if let Some(use_ssl) = self.use_ssl {
            builder = builder.use_ssl(use_ssl);
        }
        if let Some(starttls) = self.starttls {
            builder = builder.starttls(starttls);
        }
        if let Some(seconds) = self.timeout {
            let timeout = Duration::try_from_secs_f64(seconds)
                .ok()
                .filter(|t| !t.is_zero())
                .ok_or_else(|| {
                    rejected(
                        "timeout must be a positive number of seconds",
                        ProbeDetails::new(server.clone(), port),
                    )
                })?;
            builder = builder.timeout(timeout);
        }
        if let Some(subject) = self.subject {
            builder = builder.subject(subject);
        }
        if let Some(message) = self.message {
            builder = builder.message(message);
        }
        if let Some(helo_name) = non_empty(self.helo_name) {
            builder = builder.helo_name(helo_name);
        }

        Ok(builder.build())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn rejected(message: &str, details: ProbeDetails) -> ProbeResult {
    ProbeResult::fail(ProbeError::RequestInvalid(message.to_string()), details)
}

/// HTTP status for a failure kind
pub fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RequestInvalid => StatusCode::BAD_REQUEST,
        ErrorKind::AuthFailed => StatusCode::UNAUTHORIZED,
        ErrorKind::SenderRefused | ErrorKind::RecipientRefused | ErrorKind::DataError => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::ConnectionFailed
        | ErrorKind::HeloError
        | ErrorKind::StartTlsUnsupported
        | ErrorKind::TlsUpgradeFailed
        | ErrorKind::NetworkError => StatusCode::BAD_GATEWAY,
        ErrorKind::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn status_for(result: &ProbeResult) -> StatusCode {
    result
        .error_kind()
        .map(status_for_kind)
        .unwrap_or(StatusCode::OK)
}

fn respond(result: ProbeResult) -> (StatusCode, Json<ProbeResult>) {
    (status_for(&result), Json(result))
}

/// Check an SMTP server
pub async fn check_smtp(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejected check request: {}", rejection.body_text());
            return respond(rejected(
                &rejection.body_text(),
                ProbeDetails::new(String::new(), DEFAULT_PORT),
            ));
        }
    };

    let request = match body.into_probe_request() {
        Ok(request) => request,
        Err(result) => return respond(result),
    };

    let details = ProbeDetails::for_request(&request);
    let prober = state.prober.clone();
    let task = tokio::spawn(async move { prober.probe(&request).await });

    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            error!("Probe task failed: {}", e);
            ProbeResult::fail(
                ProbeError::Unexpected("probe task terminated abnormally".to_string()),
                details,
            )
        }
    };

    respond(result)
}

/// Liveness probe
pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Service description
pub async fn index() -> impl IntoResponse {
    Json(json!({
        "service": "smtp-check-rs",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /check-smtp": "Probe an SMTP server and optionally send a test message",
            "GET /healthz": "Liveness check",
            "GET /": "This description"
        }
    }))
}
