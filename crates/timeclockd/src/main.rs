use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod geocode;
mod http;
mod pipeline;

use config::Config;
use geocode::ReverseGeocoder;
use pipeline::Pipeline;
use timeclock_core::FaceEncoder;
use timeclock_store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        models = %config.model_dir.display(),
        threshold = config.match_threshold,
        "timeclockd starting"
    );

    if let Some(dir) = config.db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating data directory {}", dir.display()))?;
    }
    let store = Arc::new(Store::open(&config.db_path).context("opening database")?);

    // Fail fast if the models are missing; the engine thread owns them from
    // here on.
    let encoder = FaceEncoder::load(
        &config.detector_model_path(),
        &config.embedding_model_path(),
    )
    .context("loading face models")?;
    let encoder = engine::spawn_encoder(encoder);

    let geocoder = ReverseGeocoder::new(
        &config.geocode_endpoint,
        Duration::from_secs(config.geocode_timeout_secs),
    )
    .context("building geocoding client")?;

    let pipeline = Pipeline::new(
        Arc::clone(&store),
        encoder,
        geocoder,
        config.match_threshold,
    );

    let state = Arc::new(http::AppState {
        pipeline,
        store,
        default_scope: config.default_scope.clone(),
    });
    let app = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "timeclockd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("timeclockd shutting down");
        })
        .await?;

    Ok(())
}
