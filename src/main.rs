mod chat;
mod config;
mod image_gen;
mod ingredients;
mod models;
mod nutrition;
mod pipeline;
mod publish;
mod routes;

use anyhow::Context;
use routes::{router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{config::{mask, Settings}, pipeline::DishPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env();
    tracing::info!(
        "Using Hugging Face key {}, Spoonacular key {}, Imgur client {}",
        mask(&settings.hf_api_key),
        mask(&settings.spoonacular_api_key),
        mask(&settings.imgur_client_id)
    );
    let state = AppState {
        store: Arc::default(),
        pipeline: Arc::new(DishPipeline::new(&settings)),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
