//! Creates the initial admin user from ADMIN_USERNAME/ADMIN_PASSWORD.
//! Run once against a fresh database; re-running against an existing admin
//! is a no-op.

use anyhow::Context;
use pubrelay::{auth, db, AppError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt().init();

    let database_url = dotenv::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let username = dotenv::var("ADMIN_USERNAME").context("ADMIN_USERNAME is not set")?;
    let password = dotenv::var("ADMIN_PASSWORD").context("ADMIN_PASSWORD is not set")?;

    let db_pool = db::connect(&database_url).await?;
    match auth::create_user(&db_pool, &username, &password, "admin").await {
        Ok(id) => tracing::info!(%id, user = %username, "admin user created"),
        Err(AppError::Conflict(_)) => tracing::info!(user = %username, "admin user already exists"),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
