//! Response headers for the notification endpoint.
//!
//! Event responses must never be cached, and pages served from another
//! origin may still poll this server.

use axum::http::HeaderValue;
use axum::http::header;
use tower_http::set_header::SetResponseHeaderLayer;

/// Create layer that adds `Cache-Control: no-cache`.
pub(crate) fn no_cache_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    )
}

/// Create layer that adds `Access-Control-Allow-Origin: *`.
pub(crate) fn allow_any_origin_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    )
}
