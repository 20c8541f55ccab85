//! Zapline - campaign delivery server entry point

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zapline_api::AppState;
use zapline_common::Config;
use zapline_core::{
    CampaignEngine, CampaignRunner, DripScheduler, RateGovernor, StatusReconciler,
    TransportResolver,
};
use zapline_storage::DatabasePool;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Zapline...");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.migrate().await?;

    // Core components are constructed once and injected; the governor is
    // the one piece of state shared by campaign dispatch and drip sends
    let governor = Arc::new(RateGovernor::new());
    let transports = TransportResolver::new();

    let engine = Arc::new(CampaignEngine::new(
        db_pool.clone(),
        governor.clone(),
        transports.clone(),
        config.dispatch.clone(),
    ));

    let reconciler = Arc::new(StatusReconciler::new(db_pool.clone()));

    // Campaign runner: scheduled starts and crash recovery
    let runner_handle = {
        let runner = CampaignRunner::new(
            db_pool.clone(),
            engine.as_ref().clone(),
            config.dispatch.runner_interval_secs,
        );
        tokio::spawn(async move {
            runner.run().await;
        })
    };

    // Drip scheduler sweep
    let drip_handle = {
        let scheduler = DripScheduler::new(
            db_pool.clone(),
            governor.clone(),
            transports.clone(),
            config.drip.clone(),
            &config.dispatch,
        );
        tokio::spawn(async move {
            scheduler.run().await;
        })
    };

    // API server
    let api_handle = {
        let state = AppState {
            db_pool: db_pool.clone(),
            engine: engine.clone(),
            reconciler: reconciler.clone(),
            dispatch: config.dispatch.clone(),
            webhook: config.webhook.clone(),
        };
        let bind = format!("{}:{}", config.server.bind_address, config.api.port);
        tokio::spawn(async move {
            let app = zapline_api::create_router(state);
            let listener = match tokio::net::TcpListener::bind(&bind).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!("Failed to bind API server on {}: {}", bind, e);
                    return;
                }
            };
            info!("API server listening on {}", bind);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {}", e);
            }
        })
    };

    info!("Zapline started");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runner_handle.abort();
    drip_handle.abort();
    api_handle.abort();

    info!("Zapline shutdown complete");

    Ok(())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,zapline=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
