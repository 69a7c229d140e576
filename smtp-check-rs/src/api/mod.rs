//! REST API module for smtp-check-rs
//!
//! Exposes the prober over HTTP

pub mod handlers;
pub mod server;

pub use handlers::AppState;
pub use server::{router, ApiServer};
