//! WebSocket opening handshake (RFC 6455 section 4.2).

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Why a request could not be upgraded. The request falls through to the
/// next transport; none of these are fatal.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum HandshakeError {
    #[error("request does not ask for a websocket upgrade")]
    MissingUpgrade,
    #[error("missing or unreadable Sec-WebSocket-Key header")]
    MissingKey,
}

/// Derive `Sec-WebSocket-Accept` from the client's `Sec-WebSocket-Key`.
pub(crate) fn accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(sha1.finalize())
}

/// Validate upgrade headers and compute the accept value.
pub(crate) fn negotiate(headers: &HeaderMap) -> Result<String, HandshakeError> {
    let wants_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
    if !wants_websocket {
        return Err(HandshakeError::MissingUpgrade);
    }

    let key = headers
        .get(header::SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(HandshakeError::MissingKey)?;

    Ok(accept_key(key))
}

/// The `101 Switching Protocols` response completing the handshake.
pub(crate) fn switching_protocols(accept: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;

    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    if let Ok(accept) = HeaderValue::from_str(accept) {
        headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade_headers(upgrade: &str, key: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::UPGRADE, HeaderValue::from_str(upgrade).unwrap());
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        if let Some(key) = key {
            headers.insert(header::SEC_WEBSOCKET_KEY, HeaderValue::from_str(key).unwrap());
        }
        headers
    }

    #[test]
    fn test_accept_key_rfc_sample() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_negotiate_is_case_insensitive() {
        let headers = upgrade_headers("WebSocket", Some("dGhlIHNhbXBsZSBub25jZQ=="));
        assert_eq!(
            negotiate(&headers),
            Ok("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=".to_owned())
        );
    }

    #[test]
    fn test_negotiate_missing_key() {
        let headers = upgrade_headers("websocket", None);
        assert_eq!(negotiate(&headers), Err(HandshakeError::MissingKey));
    }

    #[test]
    fn test_negotiate_missing_upgrade() {
        assert_eq!(negotiate(&HeaderMap::new()), Err(HandshakeError::MissingUpgrade));

        let headers = upgrade_headers("h2c", Some("dGhlIHNhbXBsZSBub25jZQ=="));
        assert_eq!(negotiate(&headers), Err(HandshakeError::MissingUpgrade));
    }

    #[test]
    fn test_switching_protocols_headers() {
        let response = switching_protocols("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");

        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.headers()[header::UPGRADE], "websocket");
        assert_eq!(response.headers()[header::CONNECTION], "Upgrade");
        assert_eq!(
            response.headers()[header::SEC_WEBSOCKET_ACCEPT],
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }
}
