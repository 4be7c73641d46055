pub mod error;
pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Bare router, no CORS/rate-limiting/auth layers — those are explicitly
/// out of scope (spec §1, "external collaborators"). Lets integration
/// tests drive the app directly with `tower::ServiceExt::oneshot`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/run", post(handlers::run))
        .route("/health", get(handlers::health))
        .route("/api/stats", get(handlers::stats))
        .route("/api/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
