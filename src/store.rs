use std::future::Future;
use std::time::Duration;

use derive_new::new;
use serde::Deserialize;
use snafu::{Location, OptionExt as _, ResultExt as _, Snafu};
use tracing::instrument;

use crate::database::{self, Database, DatabaseError};
use crate::model::VideoCounter;
use crate::Located;

/// Creates the counter with one view, or adds one view to an existing counter.
///
/// `UPDATE` on a record id creates the record when it is missing, so this is a single atomic statement.
/// The title is only written when the record is created.
/// Statements get a `TIMEOUT` clause appended, see [`CounterStore::statement`].
const INCREMENT: &str = "
    UPDATE type::thing('video', $video_id) SET
        video_id = $video_id,
        title = title ?? $title,
        views = (views ?? 0) + 1
    RETURN AFTER
";

const TOP_VIEWED: &str = "
    SELECT video_id, title, views FROM video
    ORDER BY views DESC, video_id ASC
    LIMIT $limit
";

const FIND: &str = "SELECT video_id, title, views FROM type::thing('video', $video_id)";

/// Extra time the client waits past the statement timeout before giving up on the response.
const RESPONSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("`{operation}` did not finish within {timeout:?} at {location}"))]
    Timeout {
        operation: &'static str,
        timeout: Duration,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("`{operation}` failed at {location}: {source}"))]
    Database {
        operation: &'static str,
        source: DatabaseError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("counter for `{video_id}` was not returned after the update at {location}"))]
    MissingCounter {
        video_id: String,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for StorageError {
    fn location(&self) -> Location {
        match self {
            StorageError::Timeout { location, .. }
            | StorageError::Database { location, .. }
            | StorageError::MissingCounter { location, .. } => *location,
        }
    }
}

/// Row layout of the `video` table.
#[derive(Debug, Deserialize)]
struct VideoRow {
    video_id: String,
    title: String,
    views: u64,
}

impl From<VideoRow> for VideoCounter {
    fn from(row: VideoRow) -> Self {
        VideoCounter::new(row.video_id, row.title, row.views)
    }
}

/// Durable view counters, one record per video.
///
/// Every statement runs with a `TIMEOUT` of `timeout`, so the database cancels and rolls it back once it runs too
/// long. The client stops waiting for a response [`RESPONSE_GRACE`] after that.
#[derive(Debug, Clone, new)]
pub struct CounterStore {
    database: Database,
    timeout: Duration,
}

impl CounterStore {
    /// Adds one view to `video_id` and returns the counter as committed.
    #[instrument(skip(self))]
    pub async fn increment(&self, video_id: &str, title: &str) -> Result<VideoCounter, StorageError> {
        let query = self
            .database
            .sql(self.statement(INCREMENT))
            .bind(("video_id", video_id.to_string()))
            .bind(("title", title.to_string()))
            .fetch::<Option<VideoRow>>();

        let row = self.bounded("increment", query).await?;
        let row = row.context(MissingCounterSnafu { video_id })?;

        Ok(row.into())
    }

    /// The `limit` most viewed videos, most views first. Ties are ordered by video id.
    #[instrument(skip(self))]
    pub async fn top_viewed(&self, limit: usize) -> Result<Vec<VideoCounter>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = self
            .database
            .sql(self.statement(TOP_VIEWED))
            .bind(("limit", limit))
            .fetch::<Vec<VideoRow>>();

        let rows = self.bounded("top_viewed", query).await?;
        Ok(rows.into_iter().map(VideoCounter::from).collect())
    }

    /// The counter of `video_id`, if it has been viewed at least once.
    #[instrument(skip(self))]
    pub async fn find(&self, video_id: &str) -> Result<Option<VideoCounter>, StorageError> {
        let query = self
            .database
            .sql(self.statement(FIND))
            .bind(("video_id", video_id.to_string()))
            .fetch::<Option<VideoRow>>();

        let row = self.bounded("find", query).await?;
        Ok(row.map(VideoCounter::from))
    }

    /// `TIMEOUT` only takes a duration literal, so it can't be a bound parameter.
    fn statement(&self, query: &str) -> String {
        format!("{} TIMEOUT {}ms", query.trim_end(), self.timeout.as_millis())
    }

    async fn bounded<T>(
        &self, operation: &'static str, query: impl Future<Output = database::Result<T>>,
    ) -> Result<T, StorageError> {
        let timeout = self.timeout;
        let result = tokio::time::timeout(timeout + RESPONSE_GRACE, query)
            .await
            .ok()
            .context(TimeoutSnafu { operation, timeout })?;

        match result {
            Err(err) if err.is_timeout() => TimeoutSnafu { operation, timeout }.fail(),
            result => result.context(DatabaseSnafu { operation }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::reject_video_id;

    async fn store() -> CounterStore {
        let database = Database::in_memory().await.unwrap();
        CounterStore::new(database, Duration::from_secs(5))
    }

    #[derive(Deserialize)]
    struct Count {
        count: usize,
    }

    async fn rows(store: &CounterStore) -> usize {
        let count: Option<Count> = store
            .database
            .sql("SELECT count() FROM video GROUP ALL")
            .fetch()
            .await
            .unwrap();
        count.map_or(0, |count| count.count)
    }

    #[tokio::test]
    async fn first_view_creates_counter() {
        let store = store().await;

        let counter = store.increment("abc", "Demo").await.unwrap();

        assert_eq!(counter, VideoCounter::new("abc".into(), "Demo".into(), 1));
        assert_eq!(rows(&store).await, 1);
    }

    #[tokio::test]
    async fn second_view_increments_without_duplicate() {
        let store = store().await;

        store.increment("abc", "Demo").await.unwrap();
        let counter = store.increment("abc", "Demo").await.unwrap();

        assert_eq!(counter.views, 2);
        assert_eq!(rows(&store).await, 1);
    }

    #[tokio::test]
    async fn title_is_kept_from_first_view() {
        let store = store().await;

        store.increment("abc", "Demo").await.unwrap();
        let counter = store.increment("abc", "Renamed").await.unwrap();

        assert_eq!(counter.title, "Demo");
        assert_eq!(store.find("abc").await.unwrap().unwrap().title, "Demo");
    }

    #[tokio::test]
    async fn ids_with_special_characters_are_separate_records() {
        let store = store().await;

        store.increment("a-b_c:d", "Odd").await.unwrap();
        store.increment("a-b_c", "Plain").await.unwrap();

        assert_eq!(store.find("a-b_c:d").await.unwrap().unwrap().views, 1);
        assert_eq!(store.find("a-b_c").await.unwrap().unwrap().views, 1);
        assert_eq!(rows(&store).await, 2);
    }

    #[tokio::test]
    async fn find_unknown_video() {
        let store = store().await;
        assert_eq!(store.find("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn top_viewed_sorts_by_views_descending() {
        let store = store().await;

        for (video_id, views) in [("a", 5), ("b", 3), ("c", 8), ("d", 1)] {
            for _ in 0..views {
                store.increment(video_id, video_id).await.unwrap();
            }
        }

        let top = store.top_viewed(20).await.unwrap();
        let views: Vec<u64> = top.iter().map(|counter| counter.views).collect();
        assert_eq!(views, [8, 5, 3, 1]);
        assert_eq!(top[0].video_id, "c");
    }

    #[tokio::test]
    async fn top_viewed_respects_limit_and_breaks_ties_by_id() {
        let store = store().await;

        for video_id in ["c", "a", "b"] {
            store.increment(video_id, "Tie").await.unwrap();
        }

        let top = store.top_viewed(2).await.unwrap();
        let ids: Vec<&str> = top.iter().map(|counter| counter.video_id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);

        assert!(store.top_viewed(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn top_viewed_on_empty_store() {
        let store = store().await;
        assert!(store.top_viewed(20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn statements_carry_the_timeout() {
        let database = Database::in_memory().await.unwrap();
        let store = CounterStore::new(database, Duration::from_millis(1500));

        assert!(store.statement(TOP_VIEWED).ends_with("LIMIT $limit TIMEOUT 1500ms"));
        assert!(store.statement(INCREMENT).ends_with("RETURN AFTER TIMEOUT 1500ms"));
    }

    #[tokio::test]
    async fn timed_out_increment_is_rolled_back() {
        let database = Database::in_memory().await.unwrap();
        let impatient = CounterStore::new(database.clone(), Duration::ZERO);
        let store = CounterStore::new(database, Duration::from_secs(5));

        let result = impatient.increment("abc", "Demo").await;

        assert!(result.is_err(), "{result:?}");
        assert_eq!(store.find("abc").await.unwrap(), None);
        assert_eq!(rows(&store).await, 0);
    }

    #[tokio::test]
    async fn rejected_increment_leaves_no_row() {
        let store = store().await;
        reject_video_id(&store.database, "broken").await;

        let result = store.increment("broken", "Demo").await;

        assert!(matches!(result, Err(StorageError::Database { operation: "increment", .. })));
        assert_eq!(store.find("broken").await.unwrap(), None);
        assert_eq!(rows(&store).await, 0);

        store.increment("abc", "Demo").await.unwrap();
        assert_eq!(rows(&store).await, 1);
    }
}
