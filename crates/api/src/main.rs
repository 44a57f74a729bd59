use std::sync::Arc;

use anyhow::Context;

use portcullis_api::{
    GatewayConfig, GatewayState, app::build_app, identity::HttpIdentityClient,
    routes::dashboard_routes,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    portcullis_observability::init();

    let config = GatewayConfig::from_env().context("invalid gateway configuration")?;
    let registry = Arc::new(dashboard_routes()?);
    let identity = HttpIdentityClient::new(config.identity_url.clone(), config.identity_timeout)
        .context("failed to build identity client")?;

    let state = GatewayState::new(&config, registry, Arc::new(identity))?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        environment = ?config.environment,
        identity_url = %config.identity_url,
        "listening on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app).await?;
    Ok(())
}
