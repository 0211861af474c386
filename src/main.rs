use std::sync::Arc;

use anyhow::Context;
use pubrelay::{app, auth::AuthKeys, db, AppState, SubscriberRegistry};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pubrelay=info")))
        .init();

    let database_url = dotenv::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let jwt_secret = dotenv::var("JWT_SECRET").context("JWT_SECRET is not set")?;
    let bind_addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());

    let db_pool = db::connect(&database_url).await?;
    tracing::info!("connected to database");

    let registry = Arc::new(SubscriberRegistry::new());
    let state = AppState {
        db_pool,
        registry: Arc::clone(&registry),
        auth_keys: AuthKeys::from_secret(jwt_secret.as_bytes()),
    };

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown(registry))
        .await?;
    Ok(())
}

/// Waits for SIGINT/SIGTERM, then closes every open subscription so clients
/// see a clean stream termination and the server can drain its connections.
async fn shutdown(registry: Arc<SubscriberRegistry>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutting down");
    registry.close_all();
}
