//! Fan-out of [VideoViewed] events to every connected client.
//!
//! Delivery is best effort: nothing is persisted, a client only sees events sent while it is subscribed,
//! and a client that falls more than `capacity` events behind silently loses the oldest ones.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::model::VideoViewed;

#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<VideoViewed>,
}

impl NotificationBus {
    /// Creates a bus that buffers up to `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        NotificationBus { sender }
    }

    /// Pushes `event` to every current subscriber and returns how many there were.
    ///
    /// Never fails: having nobody listening is not an error.
    pub fn broadcast(&self, event: VideoViewed) -> usize {
        match self.sender.send(event) {
            Ok(subscribers) => {
                tracing::debug!(subscribers, "broadcast `{}`", VideoViewed::EVENT);
                subscribers
            }
            Err(broadcast::error::SendError(event)) => {
                tracing::debug!(?event, "no subscribers for `{}`", VideoViewed::EVENT);
                0
            }
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let receiver = self.sender.subscribe();
        tracing::info!(subscribers = self.subscribers(), "new client connected");

        Subscription {
            stream: BroadcastStream::new(receiver),
        }
    }

    /// Number of live subscriptions.
    pub fn subscribers(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription to the bus. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    stream: BroadcastStream<VideoViewed>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Stream for Subscription {
    type Item = VideoViewed;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.stream).poll_next(cx)) {
                Some(Ok(event)) => return Poll::Ready(Some(event)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "client fell behind, dropping events");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        tracing::info!("client disconnected");
    }
}
