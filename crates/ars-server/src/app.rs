//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::live_reload::{self, EVENTS_PATH};
use crate::middleware::headers;
use crate::state::AppState;
use crate::static_files;

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    let events = Router::new()
        .route(EVENTS_PATH, get(live_reload::events_handler))
        .layer(
            ServiceBuilder::new()
                .layer(headers::no_cache_layer())
                .layer(headers::allow_any_origin_layer()),
        );

    Router::new()
        .merge(events)
        .merge(static_files::static_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
