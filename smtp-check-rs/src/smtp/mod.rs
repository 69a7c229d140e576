//! Client-side SMTP protocol (RFC 5321)
//!
//! - [`client`]: command/reply exchange over a byte stream
//! - [`reply`]: reply and EHLO extension parsing
//! - [`auth`]: AUTH PLAIN / LOGIN
//! - [`message`]: test message construction and DATA encoding

pub mod auth;
pub mod client;
pub mod message;
pub mod reply;

pub use auth::Mechanism;
pub use client::SmtpClient;
pub use reply::{Extensions, Reply};
