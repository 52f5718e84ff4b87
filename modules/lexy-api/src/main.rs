use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lexy_api::{router, ApiConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lexy=info".parse()?))
        .init();

    let config = ApiConfig::from_env()?;
    let state = Arc::new(AppState::from_config(&config)?);
    let app = router(state);

    let addr = config.addr();
    info!("Lexy API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
