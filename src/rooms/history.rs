use axum::{extract::{Path, Query, State}, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::{auth::AuthUser, db, error::{AppError, AppResult}};
use crate::relay::log::{self, HistoryBounds};

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    limit: Option<i64>,
    before: Option<String>,
    after: Option<String>,
}

/// Owner-only history retrieval: `GET /api/rooms/{room_ref}/messages`.
/// `room_ref` may be the room id or the topic id; `before`/`after` are
/// RFC 3339 bounds, combinable with logical AND.
pub(crate) async fn messages(
    State(db_pool): State<SqlitePool>,
    AuthUser(principal): AuthUser,
    Path(room_ref): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Value>> {
    let room = super::find_by_ref(&db_pool, &room_ref)
        .await?
        .ok_or_else(|| AppError::NotFound("room not found".into()))?;
    if room.owner != principal.id {
        return Err(AppError::Forbidden("not the owner of this room".into()));
    }

    let bounds = HistoryBounds {
        before_ms: query.before.as_deref().map(db::rfc3339_to_ms).transpose()?,
        after_ms: query.after.as_deref().map(db::rfc3339_to_ms).transpose()?,
    };
    let limit = log::clamp_limit(query.limit);
    let messages = log::query(&db_pool, &room.id, bounds, limit).await?;

    Ok(Json(json!({ "messages": messages })))
}
