use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use snafu::ResultExt;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{ApplicationError, BindAddressSnafu, WebServerSnafu};

mod error;
mod events;
mod state;
mod videos;

pub use error::*;
pub use state::*;
pub use videos::LEADERBOARD_SIZE;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// The REST routes accept any origin. `events_cors` applies to `/api/events` only.
pub fn create_router(app: App, events_cors: CorsLayer) -> Router {
    let rest = Router::new()
        .route("/api/videos", get(videos::list))
        .route("/api/view", post(videos::record_view))
        .route("/api/videoViews", get(videos::most_viewed))
        .layer(CorsLayer::permissive());

    let realtime = Router::new()
        .route("/api/events", get(events::stream))
        .layer(events_cors);

    rest.merge(realtime)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app)
}

/// Only `frontend_url` may open the event stream when it is set, anyone otherwise.
pub fn cors(frontend_url: Option<&str>) -> CorsLayer {
    let Some(origin) = frontend_url else {
        return CorsLayer::permissive();
    };

    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET])
            .allow_headers([header::CONTENT_TYPE]),
        Err(err) => {
            tracing::warn!(origin, "ignoring invalid frontend url: {}", err);
            CorsLayer::permissive()
        }
    }
}

pub async fn serve(app: App, config: &Config) -> Result<(), ApplicationError> {
    let address = config.address();
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .context(BindAddressSnafu { address })?;

    let router = create_router(app.clone(), cors(config.frontend_url.as_deref()));

    tracing::info!("server is running on {}", address);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            app.close();
        })
        .await
        .context(WebServerSnafu)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received ctrl-c, shutting down"),
        Err(err) => {
            tracing::error!("could not listen for ctrl-c, running until killed: {}", err);
            std::future::pending::<()>().await
        }
    }
}
