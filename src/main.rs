//! Fraudgate server - main entry point
//!
//! Loads the current model artifact from the object store, then serves
//! predictions and the metrics scrape over HTTP. Retraining and model
//! refresh are triggered through the admin routes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use fraudgate::{
    config::AppConfig,
    server::gateway::ServingGateway,
    server::http::{router, AppState},
    server::loader::ModelLoader,
    server::metrics::MetricsRegistry,
    server::retrain::RetrainingCoordinator,
    store::{FsStore, ObjectStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("FRAUDGATE_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
    let config = if Path::new(&config_path).exists() {
        AppConfig::load_from_path(&config_path)?
    } else {
        AppConfig::default()
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("fraudgate={}", config.logging.level).parse()?),
        )
        .init();

    info!(config = %config_path, "starting fraudgate");

    let store: Arc<dyn ObjectStore> = Arc::new(FsStore::new(&config.store.root_dir));
    let metrics = Arc::new(MetricsRegistry::new(config.model.fraud_window));

    // No model, no service: a failed or timed-out initial load is fatal
    let loader = tokio::time::timeout(
        Duration::from_secs(config.model.startup_timeout_secs),
        ModelLoader::init(
            Arc::clone(&store),
            config.model.latest_key.clone(),
            Arc::clone(&metrics),
        ),
    )
    .await
    .with_context(|| {
        format!(
            "initial model load timed out after {}s",
            config.model.startup_timeout_secs
        )
    })?
    .context("failed to load initial model; refusing to serve")?;
    let loader = Arc::new(loader);

    let gateway = Arc::new(ServingGateway::new(
        Arc::clone(&loader),
        Arc::clone(&metrics),
        config.model.decision_threshold,
    ));
    let coordinator = Arc::new(RetrainingCoordinator::new(
        Arc::clone(&store),
        config.model.latest_key.clone(),
        Arc::clone(&metrics),
    ));

    let app = router(AppState {
        gateway,
        loader,
        coordinator,
        metrics,
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
