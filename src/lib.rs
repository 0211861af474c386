pub mod auth;
pub mod db;
pub mod error;
pub mod relay;
pub mod rooms;

use std::sync::Arc;

use axum::{extract::FromRef, http::StatusCode, Json, Router};
use serde_json::json;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;

pub use error::{AppError, AppResult};
pub use relay::SubscriberRegistry;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub registry: Arc<SubscriberRegistry>,
    pub auth_keys: auth::AuthKeys,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api/auth", auth::router())
        .nest("/api/rooms", rooms::router())
        .merge(relay::router())
        .fallback(not_found)
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "not found" })))
}
