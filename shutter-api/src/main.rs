//! shutter Server Entry Point
//!
//! Reads configuration from the environment, builds the tiered cache and the
//! upstream clients, and starts the Axum HTTP server.

use shutter_api::telemetry::init_logging;
use shutter_api::{create_router, ApiError, ApiResult, AppState, ProxyConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let config = ProxyConfig::from_env()?;
    init_logging(config.log_format)?;

    let state = AppState::from_config(&config).await?;
    let app = create_router(state);

    let addr = config.bind_addr()?;
    tracing::info!(
        %addr,
        origin = %config.origin_url,
        upstreams = config.upstreams.len(),
        store = config.store.name(),
        "Starting shutter server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
