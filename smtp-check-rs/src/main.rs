//! smtp-check: HTTP service probing SMTP servers

use smtp_check_rs::{ApiServer, ServiceConfig, SmtpProber};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config path: first argument, then environment
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SMTP_CHECK_CONFIG").ok())
        .map(PathBuf::from);

    let config = ServiceConfig::load(config_path.as_deref())?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting smtp-check-rs v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No config file specified, using defaults and environment"),
    }

    let prober = SmtpProber::new()?;
    let server = ApiServer::new(prober, config.listen_addr());
    server.run().await?;

    Ok(())
}
