use std::sync::Arc;

use axum::extract::{rejection::JsonRejection, Path, State};
use axum::Json;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::{auth::{AuthUser, Principal}, db, error::{AppError, AppResult}, rooms};

use super::log::{self, StoredMessage};
use super::registry::SubscriberRegistry;

/// The publish pipeline: validate, authorize against the room directory,
/// append to the message log, then fan out. Persistence happens before
/// broadcast, so a crash in between leaves the message recoverable through
/// the history query even though live subscribers missed it.
///
/// The broadcast frame is the payload with `timestamp` and `room` injected;
/// the server's values win over same-named keys in the payload. The stored
/// payload is never touched, so history keeps the publisher's originals.
pub async fn publish_message(
    db_pool: &SqlitePool,
    registry: &SubscriberRegistry,
    topic_id: &str,
    principal: &Principal,
    payload: Value,
) -> AppResult<StoredMessage> {
    let non_empty_object = payload.as_object().is_some_and(|map| !map.is_empty());
    if !non_empty_object {
        return Err(AppError::Validation(
            "message body must be a non-empty JSON object".into(),
        ));
    }

    let room = rooms::find_by_topic_id(db_pool, topic_id)
        .await?
        .ok_or_else(|| AppError::NotFound("room not found".into()))?;

    if room.owner != principal.id {
        return Err(AppError::Forbidden("not the owner of this room".into()));
    }

    let message = log::append(db_pool, &room.id, &principal.id, payload).await?;

    // Subscribers get the payload plus a broadcast timestamp and the room's
    // display name; the publisher gets the bare stored descriptor back.
    let mut enriched = message.payload.clone();
    if let Some(map) = enriched.as_object_mut() {
        map.insert("timestamp".into(), Value::String(db::ms_to_rfc3339(db::now_ms())));
        map.insert("room".into(), Value::String(room.name.clone()));
    }
    let delivered = registry.broadcast(topic_id, &enriched.to_string());
    tracing::info!(
        room = %room.name,
        topic = topic_id,
        delivered,
        "message stored and broadcast"
    );

    Ok(message)
}

pub(crate) async fn publish(
    State(db_pool): State<SqlitePool>,
    State(registry): State<Arc<SubscriberRegistry>>,
    Path(topic_id): Path<String>,
    AuthUser(principal): AuthUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<StoredMessage>> {
    let Json(payload) =
        payload.map_err(|err| AppError::Validation(format!("invalid JSON body: {err}")))?;
    let message = publish_message(&db_pool, &registry, &topic_id, &principal, payload).await?;
    Ok(Json(message))
}
