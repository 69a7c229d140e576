//! Configuration for smtp-check-rs
//!
//! Sources, lowest to highest precedence: built-in defaults, an optional
//! TOML file, then `SMTP_CHECK_*` environment variables.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Prefix of the environment variables read by [`ServiceConfig::load`]
pub const ENV_PREFIX: &str = "SMTP_CHECK";

/// HTTP service configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Listen host (e.g., "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Verbose logging
    #[serde(default)]
    pub debug: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
        }
    }
}

impl ServiceConfig {
    /// Merge defaults, the optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("debug", defaults.debug)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Socket address string for the listener
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Default tracing filter when `RUST_LOG` is not set
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "smtp_check_rs=debug,tower_http=debug"
        } else {
            "smtp_check_rs=info,tower_http=info"
        }
    }
}
