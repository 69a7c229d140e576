//! Client-side SMTP AUTH (RFC 4954)
//!
//! Supported mechanisms, in order of preference:
//! - PLAIN (RFC 4616), sent as an initial response
//! - LOGIN, username and password answered to two 334 challenges

use crate::error::SmtpError;
use crate::smtp::{Reply, SmtpClient};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::io::{AsyncRead, AsyncWrite};

/// SASL mechanisms this client can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Plain,
    Login,
}

impl Mechanism {
    const PREFERENCE: [Mechanism; 2] = [Mechanism::Plain, Mechanism::Login];

    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::Plain => "PLAIN",
            Mechanism::Login => "LOGIN",
        }
    }

    /// Pick the preferred mechanism among those the server advertises
    pub fn select(advertised: &[String]) -> Option<Self> {
        Self::PREFERENCE.into_iter().find(|mechanism| {
            advertised
                .iter()
                .any(|name| name.eq_ignore_ascii_case(mechanism.name()))
        })
    }
}

/// `base64("\0" username "\0" password)`
pub fn plain_response(username: &str, password: &str) -> String {
    BASE64.encode(format!("\0{}\0{}", username, password))
}

/// Run the AUTH exchange and return the server's final reply.
///
/// A 235 reply means the credentials were accepted. Any other reply ends
/// the exchange early and is returned as-is.
pub async fn authenticate<S>(
    client: &mut SmtpClient<S>,
    mechanism: Mechanism,
    username: &str,
    password: &str,
) -> Result<Reply, SmtpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match mechanism {
        Mechanism::Plain => {
            client
                .command(&format!("AUTH PLAIN {}", plain_response(username, password)))
                .await
        }
        Mechanism::Login => {
            let reply = client.command("AUTH LOGIN").await?;
            if !reply.is_intermediate() {
                return Ok(reply);
            }

            let reply = client.send_secret(&BASE64.encode(username)).await?;
            if !reply.is_intermediate() {
                return Ok(reply);
            }

            client.send_secret(&BASE64.encode(password)).await
        }
    }
}
