use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};

use super::AuthKeys;

#[derive(Debug, Deserialize)]
pub(crate) struct LoginBody {
    username: String,
    password: String,
}

pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    State(keys): State<AuthKeys>,
    Json(LoginBody { username, password }): Json<LoginBody>,
) -> AppResult<Json<Value>> {
    let row: Option<(String, String, String)> =
        sqlx::query_as("SELECT id,password_hash,role FROM users WHERE username=?")
            .bind(&username)
            .fetch_optional(&db_pool)
            .await?;

    // Same response whether the user is unknown or the password is wrong.
    let rejected = || AppError::Unauthorized("invalid username or password".into());
    let (id, hash, role) = row.ok_or_else(rejected)?;

    let ok = tokio::task::spawn_blocking(move || bcrypt::verify(&password, &hash))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(anyhow::Error::from)?;
    if !ok {
        return Err(rejected());
    }

    let token = keys.issue(&id, &role)?;
    tracing::info!(user = %username, "login succeeded");

    Ok(Json(json!({
        "id": id,
        "username": username,
        "role": role,
        "token": token,
    })))
}
