use std::sync::Arc;

use anyhow::Context;
use stockledger_infra::config::LedgerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockledger_observability::init();

    let config = LedgerConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(stockledger_api::app::services::build_services(&config).await?);
    let app = stockledger_api::app::build_app(services, config.api_token.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        lock_timeout_ms = config.lock_timeout.as_millis() as u64,
        "listening on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app).await?;
    Ok(())
}
