//! facegated is the face identity gateway daemon.
//!
//! It exposes registration, recognition, deletion and stats over HTTP,
//! runs ONNX inference on a dedicated engine thread and persists face
//! embeddings in Qdrant.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod error;
mod routes;
mod store;
mod tracker;

use config::Config;
use routes::AppState;
use store::QdrantFaceStore;
use tracker::RequestTracker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facegated starting");

    let config = Config::from_env();

    let store = QdrantFaceStore::connect(&config.qdrant_url, &config.collection, config.vector_size)?;
    tracing::info!(
        url = %config.qdrant_url,
        collection = %config.collection,
        "face store configured"
    );

    // Loads both models before the listener binds, so a broken model
    // directory fails startup instead of the first request.
    let engine = engine::spawn_engine(
        &config.scrfd_model_path(),
        &config.arcface_model_path(),
        config.detection_threshold,
    )?;

    let state = AppState {
        engine,
        store: Arc::new(store),
        tracker: Arc::new(RequestTracker::new()),
        search_limit: config.search_limit,
    };
    let router = routes::build_router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "facegated listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facegated stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
