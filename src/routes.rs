use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{models::{DishCycle, DishRequest}, pipeline::DishPipeline};

/// Holds only the latest cycle. Each generation replaces the previous one,
/// whose id then stops resolving.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<Option<DishCycle>>>,
    pub pipeline: Arc<DishPipeline>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/dish", post(generate_dish))
        .route("/api/dish/:id", get(get_dish))
        .route("/api/dish/:id/image", get(get_dish_image))
        .route("/api/dish/:id/publish", post(publish_dish))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

pub async fn generate_dish(State(state): State<AppState>, Json(body): Json<DishRequest>) -> Response {
    match state.pipeline.run(body).await {
        Ok(cycle) => {
            *state.store.write() = Some(cycle.clone());
            Json(cycle).into_response()
        }
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": format!("Failed to generate dish description: {e}") })),
        )
            .into_response(),
    }
}

fn latest(state: &AppState, id: Uuid) -> Option<DishCycle> {
    state.store.read().as_ref().filter(|c| c.id == id).cloned()
}

pub async fn get_dish(Path(id): Path<Uuid>, State(state): State<AppState>) -> Response {
    if let Some(c) = latest(&state, id) { Json(c).into_response() } else { StatusCode::NOT_FOUND.into_response() }
}

pub async fn get_dish_image(Path(id): Path<Uuid>, State(state): State<AppState>) -> Response {
    let image = latest(&state, id).and_then(|c| c.image);
    match image {
        Some(image) => ([(header::CONTENT_TYPE, "image/png")], image.bytes).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn publish_dish(Path(id): Path<Uuid>, State(state): State<AppState>) -> Response {
    // Clone out so the lock is not held across the upstream calls.
    let Some(cycle) = latest(&state, id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    tracing::info!("📤 Publishing dish {}", id);
    let result = state.pipeline.publish(&cycle).await;
    let status = if cycle.image.is_none() { StatusCode::CONFLICT } else { StatusCode::OK };
    (status, Json(result)).into_response()
}
