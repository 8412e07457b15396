//! Governance API - Main Entry Point

use anyhow::Result;
use governance_api::{bind_addr, create_app, AppState};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,governance_api=debug,rules_engine=info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Governance API");

    let state = match AppState::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to initialize application state: {:#}", e);
            return Err(e);
        }
    };

    let policies = state.engine.len();
    if policies == 0 {
        warn!("No policies registered; every resource will pass until policies are added");
    }
    info!(
        policies,
        default_schema_version = %state.engine.validator().default_version(),
        "Rules engine ready"
    );

    let app = create_app(state);

    let bind_addr = bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Governance API listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Governance API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
