use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod error;
pub mod handlers;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, DEFAULT_FETCH_TIMEOUT};

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/ingest", post(handlers::ingest))
        .route(
            "/api/trending",
            get(handlers::get_trending).put(handlers::bump_keyword),
        )
        .route("/api/articles/status", patch(handlers::set_article_status))
        .route("/api/assets/:id/download", post(handlers::download_asset))
        .route("/api/crawlers", get(handlers::list_crawlers))
        .route(
            "/api/crawlers/:name",
            get(handlers::get_crawler).patch(handlers::update_crawler),
        )
        .route("/api/crawlers/:name/toggle", post(handlers::toggle_crawler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, bind: &str) -> tw_core::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("🌐 Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, create_app(state)).await?;
    Ok(())
}

pub mod prelude {
    pub use crate::{create_app, serve, AppState};
    pub use tw_core::{Error, Result};
}
