use axum::{routing::get, Router};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db, error::{AppError, AppResult}, AppState};

mod create;
mod history;
mod list;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::list_rooms).post(create::create_room))
        .route("/{room_ref}/messages", get(history::messages))
}

pub const MAX_ROOM_NAME_LEN: usize = 100;

/// A broadcast channel: `topic_id` is the public wire identifier, `owner`
/// the only principal allowed to publish.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub topic_id: String,
    pub owner: String,
    #[serde(rename = "createdAt", serialize_with = "db::serialize_ms_rfc3339")]
    pub created_at_ms: i64,
}

/// 16 random bytes from the thread-local CSPRNG, base64url without padding.
/// 128 bits of entropy makes the topic unguessable and collisions negligible,
/// so there is no retry loop; the UNIQUE constraint still backstops it.
pub fn generate_topic_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub async fn create_room(db_pool: &SqlitePool, owner: &str, name: &str) -> AppResult<Room> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_ROOM_NAME_LEN {
        return Err(AppError::Validation(format!(
            "room name must be 1-{MAX_ROOM_NAME_LEN} characters"
        )));
    }

    let room = Room {
        id: Uuid::now_v7().to_string(),
        name: name.to_owned(),
        topic_id: generate_topic_id(),
        owner: owner.to_owned(),
        created_at_ms: db::now_ms(),
    };

    let result = sqlx::query("INSERT INTO rooms (id,name,topic_id,owner,created_at_ms) VALUES (?,?,?,?,?)")
        .bind(&room.id)
        .bind(&room.name)
        .bind(&room.topic_id)
        .bind(&room.owner)
        .bind(room.created_at_ms)
        .execute(db_pool)
        .await;

    match result {
        Ok(_) => Ok(room),
        Err(err) if db::is_unique_violation(&err) => {
            Err(AppError::Conflict("topic id already exists".into()))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn find_by_topic_id(db_pool: &SqlitePool, topic_id: &str) -> AppResult<Option<Room>> {
    let row: Option<(String, String, String, i64)> =
        sqlx::query_as("SELECT id,name,owner,created_at_ms FROM rooms WHERE topic_id=?")
            .bind(topic_id)
            .fetch_optional(db_pool)
            .await?;
    Ok(row.map(|(id, name, owner, created_at_ms)| Room {
        id,
        name,
        topic_id: topic_id.to_owned(),
        owner,
        created_at_ms,
    }))
}

/// UUID-shaped refs resolve by room id, anything else by topic id, so the
/// history endpoint accepts either form.
pub async fn find_by_ref(db_pool: &SqlitePool, room_ref: &str) -> AppResult<Option<Room>> {
    if Uuid::parse_str(room_ref).is_err() {
        return find_by_topic_id(db_pool, room_ref).await;
    }
    let row: Option<(String, String, String, i64)> =
        sqlx::query_as("SELECT name,topic_id,owner,created_at_ms FROM rooms WHERE id=?")
            .bind(room_ref)
            .fetch_optional(db_pool)
            .await?;
    Ok(row.map(|(name, topic_id, owner, created_at_ms)| Room {
        id: room_ref.to_owned(),
        name,
        topic_id,
        owner,
        created_at_ms,
    }))
}

pub async fn list_owned_by(db_pool: &SqlitePool, owner: &str) -> AppResult<Vec<Room>> {
    let rows: Vec<(String, String, String, i64)> =
        sqlx::query_as("SELECT id,name,topic_id,created_at_ms FROM rooms WHERE owner=? ORDER BY created_at_ms DESC")
            .bind(owner)
            .fetch_all(db_pool)
            .await?;
    Ok(rows
        .into_iter()
        .map(|(id, name, topic_id, created_at_ms)| Room {
            id,
            name,
            topic_id,
            owner: owner.to_owned(),
            created_at_ms,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_ids_are_fixed_length_and_url_safe() {
        for _ in 0..64 {
            let id = generate_topic_id();
            assert_eq!(id.len(), 22);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[tokio::test]
    async fn create_validates_name() {
        let pool = db::test_pool().await;
        assert!(matches!(
            create_room(&pool, "u1", "   ").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            create_room(&pool, "u1", &"x".repeat(101)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn create_then_lookup_by_topic_and_ref() {
        let pool = db::test_pool().await;
        let room = create_room(&pool, "u1", " greenhouse ").await.unwrap();
        assert_eq!(room.name, "greenhouse");

        let by_topic = find_by_topic_id(&pool, &room.topic_id).await.unwrap().unwrap();
        assert_eq!(by_topic.id, room.id);
        assert_eq!(by_topic.owner, "u1");

        let by_id = find_by_ref(&pool, &room.id).await.unwrap().unwrap();
        assert_eq!(by_id.topic_id, room.topic_id);

        let by_ref_topic = find_by_ref(&pool, &room.topic_id).await.unwrap().unwrap();
        assert_eq!(by_ref_topic.id, room.id);

        assert!(find_by_topic_id(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner() {
        let pool = db::test_pool().await;
        create_room(&pool, "u1", "a").await.unwrap();
        create_room(&pool, "u1", "b").await.unwrap();
        create_room(&pool, "u2", "c").await.unwrap();

        let rooms = list_owned_by(&pool, "u1").await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert!(rooms.iter().all(|r| r.owner == "u1"));
    }

    #[tokio::test]
    async fn duplicate_topic_id_is_a_conflict() {
        let pool = db::test_pool().await;
        let room = create_room(&pool, "u1", "a").await.unwrap();
        let err = sqlx::query("INSERT INTO rooms (id,name,topic_id,owner,created_at_ms) VALUES (?,?,?,?,?)")
            .bind(Uuid::now_v7().to_string())
            .bind("b")
            .bind(&room.topic_id)
            .bind("u2")
            .bind(db::now_ms())
            .execute(&pool)
            .await
            .unwrap_err();
        assert!(db::is_unique_violation(&err));
    }
}
