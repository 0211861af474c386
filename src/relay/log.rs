use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db, error::AppResult};

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 500;

/// One durable unit of published content. `owner` is the publishing
/// principal, redundant with the room owner at write time but kept for
/// audit. Immutable once written.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub room_id: String,
    pub owner: String,
    pub payload: Value,
    #[serde(rename = "createdAt", serialize_with = "db::serialize_ms_rfc3339")]
    pub created_at_ms: i64,
}

/// Appends one message row. A single atomic INSERT; per-room order is the
/// store's insertion order, with the time-ordered UUIDv7 id as tiebreak.
pub async fn append(
    db_pool: &SqlitePool,
    room_id: &str,
    owner: &str,
    payload: Value,
) -> AppResult<StoredMessage> {
    let message = StoredMessage {
        id: Uuid::now_v7().to_string(),
        room_id: room_id.to_owned(),
        owner: owner.to_owned(),
        payload,
        created_at_ms: db::now_ms(),
    };

    sqlx::query("INSERT INTO messages (id,room_id,owner,payload,created_at_ms) VALUES (?,?,?,?,?)")
        .bind(&message.id)
        .bind(&message.room_id)
        .bind(&message.owner)
        .bind(message.payload.to_string())
        .bind(message.created_at_ms)
        .execute(db_pool)
        .await?;

    Ok(message)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HistoryBounds {
    /// Exclusive upper bound on `created_at_ms`.
    pub before_ms: Option<i64>,
    /// Exclusive lower bound on `created_at_ms`.
    pub after_ms: Option<i64>,
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT)
}

/// History retrieval, newest first. Never feeds the live fan-out path.
pub async fn query(
    db_pool: &SqlitePool,
    room_id: &str,
    bounds: HistoryBounds,
    limit: i64,
) -> AppResult<Vec<StoredMessage>> {
    let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
        "SELECT id,owner,payload,created_at_ms FROM messages \
         WHERE room_id=? AND created_at_ms<? AND created_at_ms>? \
         ORDER BY created_at_ms DESC, id DESC LIMIT ?",
    )
    .bind(room_id)
    .bind(bounds.before_ms.unwrap_or(i64::MAX))
    .bind(bounds.after_ms.unwrap_or(i64::MIN))
    .bind(limit)
    .fetch_all(db_pool)
    .await?;

    rows.into_iter()
        .map(|(id, owner, payload, created_at_ms)| {
            let payload: Value = serde_json::from_str(&payload).map_err(anyhow::Error::from)?;
            Ok(StoredMessage {
                id,
                room_id: room_id.to_owned(),
                owner,
                payload,
                created_at_ms,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(None), DEFAULT_HISTORY_LIMIT);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(10_000)), MAX_HISTORY_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-5)), 1);
    }

    #[tokio::test]
    async fn append_then_query_newest_first() {
        let pool = db::test_pool().await;
        let first = append(&pool, "r1", "u1", json!({"temp": 21})).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = append(&pool, "r1", "u1", json!({"temp": 22})).await.unwrap();
        append(&pool, "r2", "u1", json!({"other": true})).await.unwrap();

        let messages = query(&pool, "r1", HistoryBounds::default(), 50).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, second.id);
        assert_eq!(messages[1].id, first.id);
        assert_eq!(messages[0].payload, json!({"temp": 22}));
    }

    #[tokio::test]
    async fn bounds_are_exclusive_and_combine() {
        let pool = db::test_pool().await;
        // Timestamps come from the wall clock, so write rows directly.
        for (id, ms) in [("a", 100), ("b", 200), ("c", 300)] {
            sqlx::query("INSERT INTO messages (id,room_id,owner,payload,created_at_ms) VALUES (?,?,?,?,?)")
                .bind(id)
                .bind("r1")
                .bind("u1")
                .bind("{\"n\":1}")
                .bind(ms)
                .execute(&pool)
                .await
                .unwrap();
        }

        let bounds = HistoryBounds { before_ms: Some(300), after_ms: Some(100) };
        let messages = query(&pool, "r1", bounds, 50).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "b");
    }

    #[tokio::test]
    async fn limit_bounds_response_size() {
        let pool = db::test_pool().await;
        for i in 0..5 {
            append(&pool, "r1", "u1", json!({ "i": i })).await.unwrap();
        }
        let messages = query(&pool, "r1", HistoryBounds::default(), 2).await.unwrap();
        assert_eq!(messages.len(), 2);
    }
}
