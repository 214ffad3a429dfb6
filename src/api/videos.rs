use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use snafu::ResultExt;
use tracing::instrument;

use super::error::{CatalogSnafu, InvalidBodySnafu, LeaderboardSnafu, RecordSnafu};
use super::{App, Result};
use crate::model::{CatalogVideo, VideoCounter, ViewRequest};

/// How many videos `GET /api/videoViews` returns.
pub const LEADERBOARD_SIZE: usize = 20;

#[instrument(skip(app))]
pub async fn list(State(app): State<App>) -> Result<Json<Vec<CatalogVideo>>> {
    let videos = app.youtube.popular().await.context(CatalogSnafu)?;
    Ok(Json(videos))
}

#[instrument(skip(app))]
pub async fn record_view(
    State(app): State<App>, payload: Result<Json<ViewRequest>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(request) = payload.context(InvalidBodySnafu)?;

    app.recorder
        .record_view(&request.video_id, &request.title)
        .await
        .context(RecordSnafu)?;

    Ok(StatusCode::OK)
}

#[instrument(skip(app))]
pub async fn most_viewed(State(app): State<App>) -> Result<Json<Vec<VideoCounter>>> {
    let videos = app
        .store()
        .top_viewed(LEADERBOARD_SIZE)
        .await
        .context(LeaderboardSnafu)?;

    Ok(Json(videos))
}
