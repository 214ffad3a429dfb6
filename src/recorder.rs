use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use snafu::{ensure, Location, ResultExt as _, Snafu};
use tokio::sync::Mutex;
use tracing::instrument;

use crate::model::VideoCounter;
use crate::notify::NotificationBus;
use crate::store::{CounterStore, StorageError};
use crate::Located;

/// Number of locks that video ids are hashed onto.
const STRIPES: usize = 64;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RecordError {
    #[snafu(display("video id must not be empty"))]
    InvalidVideoId {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("could not record a view for `{video_id}`: {source}"))]
    Storage {
        video_id: String,
        source: StorageError,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for RecordError {
    fn location(&self) -> Location {
        match self {
            RecordError::InvalidVideoId { location } => *location,
            RecordError::Storage { source, .. } => source.location(),
        }
    }
}

/// Records views and tells every subscriber about the new count.
///
/// Views of the same video are applied one at a time, and their events are broadcast in that same order.
/// Views of different videos only wait on each other when they hash to the same stripe.
#[derive(Debug, Clone)]
pub struct ViewRecorder {
    store: CounterStore,
    bus: NotificationBus,
    stripes: Arc<[Mutex<()>]>,
}

impl ViewRecorder {
    pub fn new(store: CounterStore, bus: NotificationBus) -> Self {
        let stripes = (0..STRIPES).map(|_| Mutex::new(())).collect();
        ViewRecorder { store, bus, stripes }
    }

    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Adds one view to `video_id`, creating its counter with `title` on the first view.
    ///
    /// The event is broadcast only once the new count is committed. A failed call broadcasts nothing.
    #[instrument(skip(self))]
    pub async fn record_view(&self, video_id: &str, title: &str) -> Result<VideoCounter, RecordError> {
        ensure!(!video_id.trim().is_empty(), InvalidVideoIdSnafu);

        let _guard = self.stripe(video_id).lock().await;

        let counter = self
            .store
            .increment(video_id, title)
            .await
            .context(StorageSnafu { video_id })?;

        let subscribers = self.bus.broadcast(counter.clone().into());
        tracing::info!(views = counter.views, subscribers, "recorded a view for `{}`", video_id);

        Ok(counter)
    }

    fn stripe(&self, video_id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        video_id.hash(&mut hasher);
        let index = hasher.finish() as usize % self.stripes.len();
        &self.stripes[index]
    }
}
