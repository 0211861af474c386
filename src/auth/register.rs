use axum::{extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db, error::{AppError, AppResult}};

use super::AuthKeys;

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterBody {
    username: String,
    password: String,
}

pub(crate) fn validate_username(username: &str) -> AppResult<()> {
    if !(3..=30).contains(&username.chars().count())
        || !username.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(AppError::Validation(
            "username must be 3-30 alphanumeric characters".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < 6 {
        return Err(AppError::Validation(
            "password must be at least 6 characters".into(),
        ));
    }
    Ok(())
}

pub async fn create_user(
    db_pool: &SqlitePool,
    username: &str,
    password: &str,
    role: &str,
) -> AppResult<String> {
    let password = password.to_owned();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(&password, bcrypt::DEFAULT_COST))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(anyhow::Error::from)?;

    let id = Uuid::now_v7().to_string();
    let result = sqlx::query("INSERT INTO users (id,username,password_hash,role,created_at_ms) VALUES (?,?,?,?,?)")
        .bind(&id)
        .bind(username)
        .bind(&hash)
        .bind(role)
        .bind(db::now_ms())
        .execute(db_pool)
        .await;

    match result {
        Ok(_) => Ok(id),
        Err(err) if db::is_unique_violation(&err) => {
            Err(AppError::Conflict("user already exists".into()))
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn register(
    State(db_pool): State<SqlitePool>,
    State(keys): State<AuthKeys>,
    Json(RegisterBody { username, password }): Json<RegisterBody>,
) -> AppResult<Response> {
    validate_username(&username)?;
    validate_password(&password)?;

    let id = create_user(&db_pool, &username, &password, "user").await?;
    let token = keys.issue(&id, "user")?;
    tracing::info!(user = %username, "registered new user");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "username": username,
            "role": "user",
            "token": token,
        })),
    )
        .into_response())
}
