use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{stream, Stream, StreamExt};
use tokio::sync::mpsc;

use super::registry::{Frame, SubscriberRegistry, SubscriptionId};

/// Long-lived subscribe stream: registers the connection, emits a connected
/// notice as the first frame, then stays pending until the client goes away
/// or the registry closes the sender. No auth, as on the original server;
/// topic ids are unguessable capability tokens.
pub(crate) async fn subscribe(
    State(registry): State<Arc<SubscriberRegistry>>,
    Path(topic_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = registry.register(&topic_id, tx);

    let connected = Event::default().data(format!(
        "Connected to topic '{topic_id}'. Waiting for messages..."
    ));
    let frames = SubscriptionStream { rx, registry, topic_id, id };
    let stream = stream::once(async move { Ok(connected) }).chain(frames);

    // Comment frames keep idle-timeout proxies from cutting the stream.
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Wraps the receiving half of a subscription. Dropping it (client
/// disconnect, or the whole response being torn down after `close_all`)
/// deregisters exactly once; the registry makes a second deregister a no-op.
struct SubscriptionStream {
    rx: mpsc::UnboundedReceiver<Frame>,
    registry: Arc<SubscriberRegistry>,
    topic_id: String,
    id: SubscriptionId,
}

impl Stream for SubscriptionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
            .map(|frame| frame.map(|frame| Ok(Event::default().data(frame))))
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        self.registry.deregister(&self.topic_id, self.id);
    }
}
