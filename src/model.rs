use derive_new::new;
use serde::{Deserialize, Serialize};

/// The persisted view counter of a single video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct VideoCounter {
    pub video_id: String,
    pub title: String,
    pub views: u64,
}

/// Pushed to every connected client after a view has been recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct VideoViewed {
    pub video_id: String,
    pub title: String,
    pub views: u64,
}

impl VideoViewed {
    /// Name of the event on the real-time channel.
    pub const EVENT: &'static str = "videoViewed";
}

impl From<VideoCounter> for VideoViewed {
    fn from(counter: VideoCounter) -> Self {
        VideoViewed {
            video_id: counter.video_id,
            title: counter.title,
            views: counter.views,
        }
    }
}

/// A video entry from the catalog, as served by `GET /api/videos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct CatalogVideo {
    pub video_id: String,
    pub title: String,
    pub thumbnail: String,
}

/// Body of `POST /api/view`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct ViewRequest {
    pub video_id: String,
    #[serde(default)]
    pub title: String,
}
