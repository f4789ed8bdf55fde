//! Edge CA - application entry point.

use anyhow::{Context, Result};
use edge_ca::configs::AppConfig;
use edge_ca::webserver;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("edge_ca=info")),
        )
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    tracing::info!(
        domain = %config.domain,
        cert_mode = %config.cert_mode,
        pki_dir = %config.pki_dir.display(),
        "starting edge-ca"
    );

    webserver::start_webserver(config)
}
