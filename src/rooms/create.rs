use axum::{extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::{auth::AuthUser, error::AppResult};

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomBody {
    name: String,
}

pub(crate) async fn create_room(
    State(db_pool): State<SqlitePool>,
    AuthUser(principal): AuthUser,
    Json(NewRoomBody { name }): Json<NewRoomBody>,
) -> AppResult<Response> {
    let room = super::create_room(&db_pool, &principal.id, &name).await?;
    tracing::info!(room = %room.name, topic = %room.topic_id, owner = %principal.id, "room created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "room created", "room": room })),
    )
        .into_response())
}
