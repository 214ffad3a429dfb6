use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tracing::instrument;

use super::App;
use crate::model::VideoViewed;

/// Server-sent `videoViewed` events, one per recorded view, for as long as the client stays connected.
#[instrument(skip(app))]
pub async fn stream(State(app): State<App>) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = app
        .bus()
        .subscribe()
        .map(|viewed| Event::default().event(VideoViewed::EVENT).json_data(&viewed))
        .take_until(app.closed());

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
