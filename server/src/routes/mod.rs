//! HTTP route definitions.

mod conflicts;
mod health;
mod quotes;
mod sync;
mod ws;

use crate::AppState;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(quotes::routes())
        .merge(sync::routes())
        .merge(conflicts::routes())
        .merge(ws::routes())
}

/// The full application: routes, tracing, CORS and state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
