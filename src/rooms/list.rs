use axum::{extract::State, Json};
use sqlx::SqlitePool;

use crate::{auth::AuthUser, error::AppResult};

use super::Room;

pub(crate) async fn list_rooms(
    State(db_pool): State<SqlitePool>,
    AuthUser(principal): AuthUser,
) -> AppResult<Json<Vec<Room>>> {
    Ok(Json(super::list_owned_by(&db_pool, &principal.id).await?))
}
