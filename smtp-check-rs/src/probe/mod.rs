//! SMTP probe engine
//!
//! Runs the full protocol sequence against one server over one connection
//! and classifies the first failure:
//!
//! 1. connect (plain or implicit TLS) and read the banner
//! 2. EHLO, falling back to HELO
//! 3. STARTTLS and a second EHLO, when requested
//! 4. AUTH, when a username is given
//! 5. MAIL/RCPT/DATA, or NOOP when no message should be sent
//! 6. QUIT
//!
//! The engine keeps no state between probes. Every probe owns its
//! connection, which is closed before [`SmtpProber::probe`] returns.

pub mod request;
pub mod result;

pub use request::{ProbeRequest, ProbeRequestBuilder};
pub use result::{ProbeDetails, ProbeResult, ProbeStatus};

use crate::error::{ProbeError, Result};
use crate::smtp::client::default_helo_name;
use crate::smtp::message::build_message;
use crate::smtp::{auth, Extensions, Mechanism, SmtpClient};
use crate::transport::{BoxedStream, Connector, TcpConnector, TlsClient};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const SENT_MESSAGE: &str = "Email sent successfully";
const VERIFIED_MESSAGE: &str = "SMTP connection verified";

type Session = SmtpClient<BoxedStream>;

/// Probes SMTP servers
///
/// Cheap to clone; clones share the connector.
///
/// # Examples
/// ```no_run
/// use smtp_check_rs::probe::{ProbeRequest, SmtpProber};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prober = SmtpProber::new()?;
/// let request = ProbeRequest::builder("smtp.example.com")
///     .credentials("user@example.com", "secret")
///     .envelope("user@example.com", "inbox@example.org")
///     .build();
///
/// let result = prober.probe(&request).await;
/// println!("{}: {}", result.is_pass(), result.message);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SmtpProber {
    connector: Arc<dyn Connector>,
}

impl SmtpProber {
    /// Prober using TCP and the system trust store
    pub fn new() -> Result<Self> {
        let tls = TlsClient::with_native_roots()?;
        Ok(Self::with_connector(Arc::new(TcpConnector::new(tls))))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Run one probe. Never fails: every problem is reported in the
    /// returned result, together with the progress made before it.
    pub async fn probe(&self, request: &ProbeRequest) -> ProbeResult {
        let mut details = ProbeDetails::for_request(request);

        if let Err(err) = request.validate() {
            warn!("Rejected probe request for {}: {}", request.target(), err);
            return ProbeResult::fail(err, details);
        }

        info!(
            "Probing {} (ssl={}, starttls={}, auth={}, send={})",
            request.target(),
            request.use_ssl,
            request.starttls,
            request.username.is_some(),
            request.send_email
        );

        match self.run(request, &mut details).await {
            Ok(message) => {
                info!("Probe of {} passed: {}", request.target(), message);
                ProbeResult::pass(message, details)
            }
            Err(err) => {
                warn!(
                    "Probe of {} failed [{}]: {}",
                    request.target(),
                    err.kind(),
                    err
                );
                ProbeResult::fail(err, details)
            }
        }
    }

    async fn run(
        &self,
        request: &ProbeRequest,
        details: &mut ProbeDetails,
    ) -> std::result::Result<&'static str, ProbeError> {
        let helo_name = request.helo_name.clone().unwrap_or_else(default_helo_name);

        let session = self.connect(request, details).await?;
        let (mut session, extensions) = self
            .negotiate(session, request, &helo_name, details)
            .await?;

        let outcome = self
            .transact(&mut session, &extensions, request, details)
            .await;

        // A broken transport would only stall QUIT until the timeout
        if !matches!(outcome, Err(ProbeError::Network { .. })) {
            session.quit().await;
        }

        outcome
    }

    /// Step 1: open the transport and read the banner
    async fn connect(
        &self,
        request: &ProbeRequest,
        details: &mut ProbeDetails,
    ) -> std::result::Result<Session, ProbeError> {
        let failed = |reason: String, reply| ProbeError::ConnectionFailed {
            target: request.target(),
            reason,
            reply,
        };

        let connecting = self
            .connector
            .connect(&request.server, request.port, request.use_ssl);
        let stream = match timeout(request.timeout, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(failed(e.to_string(), None)),
            Err(_) => {
                return Err(failed(
                    format!("timed out after {:.1}s", request.timeout.as_secs_f64()),
                    None,
                ))
            }
        };

        let mut session = SmtpClient::new(stream, request.timeout);
        let banner = session
            .read_reply()
            .await
            .map_err(|e| failed(format!("no greeting from server: {}", e), None))?;

        if banner.code != 220 {
            return Err(failed(
                "server refused the connection".to_string(),
                Some(banner),
            ));
        }

        // The connection step ends with the greeting
        if request.use_ssl {
            details.used_ssl = true;
        }

        debug!("Connected to {}", request.target());
        Ok(session)
    }

    /// Steps 2 and 3: greeting and optional STARTTLS upgrade
    async fn negotiate(
        &self,
        mut session: Session,
        request: &ProbeRequest,
        helo_name: &str,
        details: &mut ProbeDetails,
    ) -> std::result::Result<(Session, Extensions), ProbeError> {
        let extensions = greet(&mut session, helo_name).await?;

        if request.use_ssl || !request.starttls {
            return Ok((session, extensions));
        }

        if !extensions.supports("STARTTLS") {
            session.quit().await;
            return Err(ProbeError::StartTlsUnsupported);
        }

        let reply = session.command("STARTTLS").await?;
        if reply.code != 220 {
            session.quit().await;
            return Err(ProbeError::TlsUpgradeFailed {
                reason: "server refused STARTTLS".to_string(),
                reply: Some(reply),
            });
        }

        let limit = session.timeout();
        let upgrading = self
            .connector
            .starttls(&request.server, session.into_inner());
        let stream = match timeout(limit, upgrading).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ProbeError::TlsUpgradeFailed {
                    reason: e.to_string(),
                    reply: None,
                })
            }
            Err(_) => {
                return Err(ProbeError::TlsUpgradeFailed {
                    reason: format!("handshake timed out after {:.1}s", limit.as_secs_f64()),
                    reply: None,
                })
            }
        };

        // Capabilities must be queried again over the encrypted channel
        let mut session = SmtpClient::new(stream, limit);
        let extensions = greet(&mut session, helo_name).await?;
        details.used_starttls = true;

        Ok((session, extensions))
    }

    /// Steps 4 and 5: authentication, then send or NOOP
    async fn transact(
        &self,
        session: &mut Session,
        extensions: &Extensions,
        request: &ProbeRequest,
        details: &mut ProbeDetails,
    ) -> std::result::Result<&'static str, ProbeError> {
        if let Some((username, password)) = request.credentials() {
            login(session, extensions, username, password).await?;
            details.authenticated = true;
        }

        if request.send_email {
            send(session, request).await?;
            details.sent = true;
            return Ok(SENT_MESSAGE);
        }

        let reply = session.command("NOOP").await?;
        if !reply.is_positive() {
            return Err(ProbeError::Network {
                reason: "server rejected NOOP".to_string(),
                reply: Some(reply),
            });
        }

        Ok(VERIFIED_MESSAGE)
    }
}

/// EHLO, or HELO when the server does not speak ESMTP
async fn greet(session: &mut Session, helo_name: &str) -> std::result::Result<Extensions, ProbeError> {
    let ehlo = session.command(&format!("EHLO {}", helo_name)).await?;
    if ehlo.is_positive() {
        return Ok(Extensions::from_ehlo(&ehlo));
    }

    debug!("EHLO rejected with {}, falling back to HELO", ehlo.code);
    let helo = session.command(&format!("HELO {}", helo_name)).await?;
    if helo.is_positive() {
        return Ok(Extensions::default());
    }

    Err(ProbeError::HeloError { reply: helo })
}

async fn login(
    session: &mut Session,
    extensions: &Extensions,
    username: &str,
    password: &str,
) -> std::result::Result<(), ProbeError> {
    let offered = extensions.auth_mechanisms();
    if offered.is_empty() {
        return Err(ProbeError::AuthFailed {
            reason: "server does not advertise AUTH".to_string(),
            reply: None,
        });
    }

    let mechanism = Mechanism::select(offered).ok_or_else(|| ProbeError::AuthFailed {
        reason: format!("no supported AUTH mechanism (server offers {})", offered.join(", ")),
        reply: None,
    })?;

    debug!("Authenticating as {} with {}", username, mechanism.name());
    let reply = auth::authenticate(session, mechanism, username, password).await?;
    if reply.code != 235 {
        return Err(ProbeError::AuthFailed {
            reason: "credentials rejected".to_string(),
            reply: Some(reply),
        });
    }

    Ok(())
}

/// Submit the test message to a single recipient
async fn send(session: &mut Session, request: &ProbeRequest) -> std::result::Result<(), ProbeError> {
    let (Some(from), Some(to)) = (request.from_address.as_deref(), request.to_address.as_deref()) else {
        return Err(ProbeError::RequestInvalid(
            "from_email and to_email are required when send_email=true".to_string(),
        ));
    };

    let reply = session.command(&format!("MAIL FROM:<{}>", from)).await?;
    if !reply.is_positive() {
        return Err(ProbeError::SenderRefused {
            sender: from.to_string(),
            reply,
        });
    }

    let reply = session.command(&format!("RCPT TO:<{}>", to)).await?;
    if !reply.is_positive() {
        let mut recipients = BTreeMap::new();
        recipients.insert(to.to_string(), reply);
        return Err(ProbeError::RecipientRefused { recipients });
    }

    let reply = session.command("DATA").await?;
    if reply.code != 354 {
        return Err(ProbeError::DataError { reply });
    }

    let message = build_message(from, to, &request.subject, &request.message)
        .map_err(|e| ProbeError::Unexpected(format!("failed to build message: {}", e)))?;
    let reply = session.send_data(&message).await?;
    if !reply.is_positive() {
        return Err(ProbeError::DataError { reply });
    }

    Ok(())
}
