use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use super::AppState;
use super::handlers::{build, health};

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/build",
            get(build::build_endpoint).post(build::build_endpoint),
        )
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
