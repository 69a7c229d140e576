//! smtp-check-rs: SMTP server probe service
//!
//! Connects to an SMTP server, walks the submission handshake and reports
//! the first step that failed, with a stable classification.
//!
//! # Features
//!
//! - **Transport**: plain TCP, implicit TLS (SMTPS) or STARTTLS upgrade
//! - **Authentication**: AUTH PLAIN and AUTH LOGIN
//! - **Delivery check**: send a test message, or verify the session with NOOP
//! - **HTTP API**: `POST /check-smtp` returning a JSON verdict
//!
//! # Example
//!
//! ```no_run
//! use smtp_check_rs::probe::{ProbeRequest, SmtpProber};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let prober = SmtpProber::new()?;
//!
//!     let request = ProbeRequest::builder("smtp.example.com")
//!         .credentials("user@example.com", "secret")
//!         .send_email(false)
//!         .build();
//!
//!     let result = prober.probe(&request).await;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`probe`]: the probe engine, requests and results
//! - [`smtp`]: SMTP client protocol pieces
//! - [`transport`]: TCP and TLS connectors
//! - [`api`]: HTTP endpoints
//! - [`config`]: Service configuration
//! - [`error`]: Error types and classification

pub mod api;
pub mod config;
pub mod error;
pub mod probe;
pub mod smtp;
pub mod transport;

// Re-export commonly used types
pub use api::ApiServer;
pub use config::ServiceConfig;
pub use error::{ErrorKind, ProbeError, Result, ServiceError};
pub use probe::{ProbeDetails, ProbeRequest, ProbeResult, ProbeStatus, SmtpProber};
