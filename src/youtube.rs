use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use serde::Deserialize;
use snafu::{Location, ResultExt, Snafu};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::instrument;
use url::Url;

use crate::error::{ApplicationError, YouTubeClientSnafu};
use crate::model::CatalogVideo;
use crate::Located;

/// Attempts after the first one for a failing category request.
const RETRIES: usize = 2;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn connect(config: &YouTubeConfig) -> Result<YouTube, ApplicationError> {
    if config.api_key.is_empty() {
        tracing::warn!("no YouTube API key configured, catalog requests will most likely be rejected");
    }

    YouTube::new(config.clone()).context(YouTubeClientSnafu)
}

#[derive(Clone)]
pub struct YouTubeConfig {
    pub api_key: String,
    /// Base of the Data API, `videos` is resolved against it.
    pub api_url: Url,
    pub region: String,
    pub max_results: u32,
    pub categories: Vec<String>,
}

impl std::fmt::Debug for YouTubeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YouTubeConfig")
            .field("api_url", &self.api_url.as_str())
            .field("region", &self.region)
            .field("max_results", &self.max_results)
            .field("categories", &self.categories)
            .finish_non_exhaustive()
    }
}

/// Client for the "most popular" chart of the YouTube Data API.
#[derive(Debug, Clone)]
pub struct YouTube {
    client: reqwest::Client,
    videos_url: Url,
    config: Arc<YouTubeConfig>,
}

impl YouTube {
    pub fn new(config: YouTubeConfig) -> Result<Self, YouTubeError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context(BuildClientSnafu)?;

        let mut base = config.api_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let videos_url = base.join("videos").context(InvalidUrlSnafu {
            url: config.api_url.to_string(),
        })?;

        Ok(YouTube {
            client,
            videos_url,
            config: Arc::new(config),
        })
    }

    /// Most popular videos of every configured category, concatenated in category order.
    #[instrument(skip(self))]
    pub async fn popular(&self) -> Result<Vec<CatalogVideo>, YouTubeError> {
        let requests = self
            .config
            .categories
            .iter()
            .map(|category| self.popular_in(category));

        let videos = try_join_all(requests).await?;
        Ok(videos.into_iter().flatten().collect())
    }

    /// Most popular videos of one category, retrying transient failures.
    #[instrument(skip(self))]
    pub async fn popular_in(&self, category: &str) -> Result<Vec<CatalogVideo>, YouTubeError> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(50)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(RETRIES);

        RetryIf::spawn(
            strategy,
            || self.fetch_category(category),
            YouTubeError::is_transient,
        )
        .await
    }

    async fn fetch_category(&self, category: &str) -> Result<Vec<CatalogVideo>, YouTubeError> {
        tracing::info!("fetch popular videos of category `{}`", category);

        let max_results = self.config.max_results.to_string();
        let response = self
            .client
            .get(self.videos_url.clone())
            .query(&[
                ("part", "snippet"),
                ("chart", "mostPopular"),
                ("regionCode", self.config.region.as_str()),
                ("maxResults", max_results.as_str()),
                ("videoCategoryId", category),
                ("key", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .context(RequestSnafu { category })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return StatusSnafu {
                category,
                status: status.as_u16(),
                message,
            }
            .fail();
        }

        let body: PopularVideos = response
            .json()
            .await
            .context(InvalidBodySnafu { category })?;

        Ok(body.into_catalog())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum YouTubeError {
    #[snafu(display("could not build the HTTP client: {source}"))]
    BuildClient {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("`{url}` is not a usable API base: {source}"))]
    InvalidUrl {
        url: String,
        source: url::ParseError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("request for category `{category}` failed: {source}"))]
    Request {
        category: String,
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("API returned {status} for category `{category}`: {message}"))]
    Status {
        category: String,
        status: u16,
        message: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("malformed response for category `{category}`: {source}"))]
    InvalidBody {
        category: String,
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

impl YouTubeError {
    /// Whether trying the same request again could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            YouTubeError::Request { .. } => true,
            YouTubeError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl Located for YouTubeError {
    fn location(&self) -> Location {
        match self {
            YouTubeError::BuildClient { location, .. }
            | YouTubeError::InvalidUrl { location, .. }
            | YouTubeError::Request { location, .. }
            | YouTubeError::Status { location, .. }
            | YouTubeError::InvalidBody { location, .. } => *location,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PopularVideos {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    id: String,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl PopularVideos {
    fn into_catalog(self) -> Vec<CatalogVideo> {
        self.items
            .into_iter()
            .map(|item| CatalogVideo {
                video_id: item.id,
                title: item.snippet.title,
                thumbnail: item
                    .snippet
                    .thumbnails
                    .default
                    .map(|thumbnail| thumbnail.url)
                    .unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    fn config(api_url: Url) -> YouTubeConfig {
        YouTubeConfig {
            api_key: "secret".to_string(),
            api_url,
            region: "US".to_string(),
            max_results: 2,
            categories: vec!["1".to_string(), "10".to_string()],
        }
    }

    async fn serve(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        Url::parse(&format!("http://{address}/youtube/v3/")).unwrap()
    }

    async fn chart(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        assert_eq!(params["chart"], "mostPopular");
        assert_eq!(params["key"], "secret");
        assert_eq!(params["regionCode"], "US");
        assert_eq!(params["maxResults"], "2");

        let category = &params["videoCategoryId"];
        Json(json!({
            "items": [
                {
                    "id": format!("{category}-a"),
                    "snippet": {
                        "title": format!("Category {category} A"),
                        "thumbnails": { "default": { "url": format!("https://img/{category}-a.jpg") } }
                    }
                },
                {
                    "id": format!("{category}-b"),
                    "snippet": { "title": format!("Category {category} B"), "thumbnails": {} }
                }
            ]
        }))
    }

    #[test]
    fn map_api_response() {
        let body: PopularVideos = serde_json::from_value(json!({
            "kind": "youtube#videoListResponse",
            "items": [{
                "id": "dQw4w9WgXcQ",
                "snippet": {
                    "title": "Never Gonna Give You Up",
                    "thumbnails": {
                        "default": { "url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/default.jpg", "width": 120 },
                        "high": { "url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg" }
                    }
                }
            }]
        }))
        .unwrap();

        assert_eq!(
            body.into_catalog(),
            [CatalogVideo::new(
                "dQw4w9WgXcQ".into(),
                "Never Gonna Give You Up".into(),
                "https://i.ytimg.com/vi/dQw4w9WgXcQ/default.jpg".into()
            )]
        );
    }

    #[test]
    fn missing_items_is_an_empty_list() {
        let body: PopularVideos = serde_json::from_value(json!({})).unwrap();
        assert!(body.into_catalog().is_empty());
    }

    #[test]
    fn api_url_without_trailing_slash() {
        let youtube = YouTube::new(config(Url::parse("http://localhost/youtube/v3").unwrap())).unwrap();
        assert_eq!(youtube.videos_url.as_str(), "http://localhost/youtube/v3/videos");
    }

    #[test]
    fn debug_hides_api_key() {
        let config = config(Url::parse("http://localhost/").unwrap());
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[tokio::test]
    async fn popular_keeps_category_order() {
        let url = serve(Router::new().route("/youtube/v3/videos", get(chart))).await;
        let youtube = YouTube::new(config(url)).unwrap();

        let videos = youtube.popular().await.unwrap();

        let ids: Vec<&str> = videos.iter().map(|video| video.video_id.as_str()).collect();
        assert_eq!(ids, ["1-a", "1-b", "10-a", "10-b"]);
        assert_eq!(videos[0].thumbnail, "https://img/1-a.jpg");
        assert_eq!(videos[1].thumbnail, "");
    }

    async fn failing(State((attempts, status)): State<(Arc<AtomicUsize>, StatusCode)>) -> StatusCode {
        attempts.fetch_add(1, Ordering::SeqCst);
        status
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/youtube/v3/videos", get(failing))
            .with_state((attempts.clone(), StatusCode::SERVICE_UNAVAILABLE));
        let youtube = YouTube::new(config(serve(router).await)).unwrap();

        let result = youtube.popular_in("1").await;

        assert!(matches!(result, Err(YouTubeError::Status { status: 503, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1 + RETRIES);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/youtube/v3/videos", get(failing))
            .with_state((attempts.clone(), StatusCode::FORBIDDEN));
        let youtube = YouTube::new(config(serve(router).await)).unwrap();

        let result = youtube.popular().await;

        assert!(matches!(result, Err(YouTubeError::Status { status: 403, .. })));
        assert!(!result.unwrap_err().is_transient());
    }
}
