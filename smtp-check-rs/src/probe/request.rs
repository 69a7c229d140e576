//! Probe request and its defaults

use crate::error::ProbeError;
use std::time::Duration;

/// Submission port
pub const DEFAULT_PORT: u16 = 587;

/// SMTPS port; implies implicit TLS unless overridden
pub const IMPLICIT_TLS_PORT: u16 = 465;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_SUBJECT: &str = "SMTP Test";

pub const DEFAULT_MESSAGE: &str = "This is a test email for SMTP validation.";

/// Everything needed for one probe
///
/// Build with [`ProbeRequest::builder`] so that `use_ssl` and `starttls`
/// get their port-derived defaults.
///
/// # Examples
/// ```
/// use smtp_check_rs::probe::ProbeRequest;
///
/// let request = ProbeRequest::builder("smtp.example.com")
///     .port(465)
///     .credentials("user@example.com", "secret")
///     .send_email(false)
///     .build();
///
/// assert!(request.use_ssl);
/// assert!(!request.starttls);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    /// Submit a message, or only check the session with NOOP
    pub send_email: bool,
    /// Connect with implicit TLS
    pub use_ssl: bool,
    /// Upgrade a plaintext connection with STARTTLS
    pub starttls: bool,
    /// Bound for the connect and for every read and write afterwards
    pub timeout: Duration,
    pub subject: String,
    pub message: String,
    /// Name announced in EHLO; the local host name when unset
    pub helo_name: Option<String>,
}

impl ProbeRequest {
    pub fn builder(server: impl Into<String>) -> ProbeRequestBuilder {
        ProbeRequestBuilder::new(server)
    }

    /// Check the request shape. Runs before any network I/O.
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.server.trim().is_empty() {
            return Err(invalid("smtp_server is required"));
        }

        if self.send_email && (self.from_address.is_none() || self.to_address.is_none()) {
            return Err(invalid(
                "from_email and to_email are required when send_email=true",
            ));
        }

        if self.username.is_some() && self.password.is_none() {
            return Err(invalid("password is required when username is provided"));
        }

        // Addresses go inside <...> on MAIL FROM and RCPT TO
        let bad_address = |value: &Option<String>| {
            value
                .as_deref()
                .is_some_and(|v| v.contains(|c: char| c.is_whitespace() || c == '<' || c == '>'))
        };
        if bad_address(&self.from_address) || bad_address(&self.to_address) {
            return Err(invalid(
                "from_email and to_email must be bare addresses without whitespace or angle brackets",
            ));
        }
        if self.helo_name.as_deref().is_some_and(|v| v.contains(['\r', '\n'])) {
            return Err(invalid("helo_name must not contain line breaks"));
        }

        if self.timeout.is_zero() {
            return Err(invalid("timeout must be a positive number of seconds"));
        }

        Ok(())
    }

    /// Username and password, when authentication was requested
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        }
    }

    /// `server:port`
    pub fn target(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

fn invalid(message: &str) -> ProbeError {
    ProbeError::RequestInvalid(message.to_string())
}

/// Builder for [`ProbeRequest`]
#[derive(Debug, Clone)]
pub struct ProbeRequestBuilder {
    server: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    from_address: Option<String>,
    to_address: Option<String>,
    send_email: bool,
    use_ssl: Option<bool>,
    starttls: Option<bool>,
    timeout: Duration,
    subject: String,
    message: String,
    helo_name: Option<String>,
}

impl ProbeRequestBuilder {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            from_address: None,
            to_address: None,
            send_email: true,
            use_ssl: None,
            starttls: None,
            timeout: DEFAULT_TIMEOUT,
            subject: DEFAULT_SUBJECT.to_string(),
            message: DEFAULT_MESSAGE.to_string(),
            helo_name: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    pub fn password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username(Some(username.into()))
            .password(Some(password.into()))
    }

    pub fn from_address(mut self, from: Option<String>) -> Self {
        self.from_address = from;
        self
    }

    pub fn to_address(mut self, to: Option<String>) -> Self {
        self.to_address = to;
        self
    }

    /// Shorthand for setting both envelope addresses
    pub fn envelope(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_address(Some(from.into()))
            .to_address(Some(to.into()))
    }

    pub fn send_email(mut self, send_email: bool) -> Self {
        self.send_email = send_email;
        self
    }

    /// Explicit value; overrides the port-based default
    pub fn use_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = Some(use_ssl);
        self
    }

    /// Explicit value; overrides the `!use_ssl` default
    pub fn starttls(mut self, starttls: bool) -> Self {
        self.starttls = Some(starttls);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn helo_name(mut self, helo_name: impl Into<String>) -> Self {
        self.helo_name = Some(helo_name.into());
        self
    }

    pub fn build(self) -> ProbeRequest {
        let use_ssl = self.use_ssl.unwrap_or(self.port == IMPLICIT_TLS_PORT);
        let starttls = self.starttls.unwrap_or(!use_ssl);

        ProbeRequest {
            server: self.server,
            port: self.port,
            username: self.username,
            password: self.password,
            from_address: self.from_address,
            to_address: self.to_address,
            send_email: self.send_email,
            use_ssl,
            starttls,
            timeout: self.timeout,
            subject: self.subject,
            message: self.message,
            helo_name: self.helo_name,
        }
    }
}
