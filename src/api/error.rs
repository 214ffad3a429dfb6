use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use snafu::{Location, Snafu};

use crate::recorder::RecordError;
use crate::store::StorageError;
use crate::youtube::YouTubeError;
use crate::Located;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum ApiError {
    #[snafu(display("could not fetch the video catalog: {source}"))]
    Catalog { source: YouTubeError },

    #[snafu(display("{source}"))]
    Record { source: RecordError },

    #[snafu(display("could not read the most viewed videos: {source}"))]
    Leaderboard { source: StorageError },

    #[snafu(display("invalid request body: {source}"))]
    InvalidBody {
        source: JsonRejection,
        #[snafu(implicit)]
        location: Location,
    },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody { .. }
            | ApiError::Record {
                source: RecordError::InvalidVideoId { .. },
            } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Located for ApiError {
    fn location(&self) -> Location {
        match self {
            ApiError::Catalog { source } => source.location(),
            ApiError::Record { source } => source.location(),
            ApiError::Leaderboard { source } => source.location(),
            ApiError::InvalidBody { location, .. } => *location,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(location = %self.location(), "request failed: {}", self);
            return (status, "Server error").into_response();
        }

        tracing::debug!(location = %self.location(), "rejected request: {}", self);
        (status, self.to_string()).into_response()
    }
}
