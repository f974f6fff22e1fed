//! Binary entrypoint for the ip-labels action service.
use anyhow::Context;
use ipl_api::{create_app, AppState, ServiceConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env().context("invalid service configuration")?;
    let bind_addr = config.bind_addr;
    tracing::info!(
        share_root = %config.share_root.display(),
        platform_timeout_ms = config.platform_timeout_ms,
        max_warnings = config.max_warnings,
        "configuration loaded"
    );

    let state = AppState::from_config(config).context("failed to initialize service")?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!(%bind_addr, "ip-labels service listening");
    axum::serve(listener, create_app(state))
        .await
        .context("server error")?;
    Ok(())
}
