use axum::{routing::get, Router};

use crate::AppState;

pub mod log;
mod publish;
pub mod registry;
mod subscribe;

pub use publish::publish_message;
pub use registry::SubscriberRegistry;

/// Mounted at the server root, as on the original server: `GET /{topic_id}`
/// opens the subscribe stream, `POST /{topic_id}` publishes.
pub fn router() -> Router<AppState> {
    Router::new().route("/{topic_id}", get(subscribe::subscribe).post(publish::publish))
}
