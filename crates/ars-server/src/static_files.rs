//! Static file serving from the watched directory.
//!
//! HTML pages get the live reload bootstrap script; everything else is sent
//! as-is with a guessed content type.

use std::io;
use std::path::{Component, Path};
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{Uri, header};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use tower_http::compression::CompressionLayer;

use crate::error::ServerError;
use crate::live_reload::client::inject_client_script;
use crate::state::AppState;

/// Served for `/` and directory paths.
const INDEX_FILE: &str = "index.html";

/// Create router serving files for every path no other route claims.
pub(crate) fn static_router() -> Router<Arc<AppState>> {
    Router::new()
        .fallback(serve_file)
        .layer(CompressionLayer::new())
}

/// Decode a request path into a path relative to the served root.
fn relative_path(uri_path: &str) -> Result<String, ServerError> {
    let decoded = percent_decode_str(uri_path)
        .decode_utf8()
        .map_err(|_| ServerError::InvalidPath(uri_path.to_owned()))?;
    let relative = decoded.trim_start_matches('/');

    let contained = Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !contained {
        return Err(ServerError::InvalidPath(relative.to_owned()));
    }

    Ok(relative.to_owned())
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}

async fn serve_file(
    State(state): State<Arc<AppState>>,
    uri: Uri,
) -> Result<Response, ServerError> {
    let relative = relative_path(uri.path())?;

    let mut path = state.root.join(&relative);
    if tokio::fs::metadata(&path)
        .await
        .is_ok_and(|meta| meta.is_dir())
    {
        path.push(INDEX_FILE);
    }

    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ServerError::NotFound(relative));
        }
        Err(e) => return Err(e.into()),
    };

    if is_html(&path) {
        let html = String::from_utf8_lossy(&content);
        let page = inject_client_script(&html, &state.client_script);
        return Ok((
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            page,
        )
            .into_response());
    }

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.to_string())], content).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::live_reload::hub::{BroadcastHub, HubOptions};

    const SCRIPT: &str = "<script>reload()</script>";

    fn router(dir: &TempDir) -> Router {
        let state = Arc::new(AppState {
            root: dir.path().to_path_buf(),
            hub: Arc::new(BroadcastHub::new(HubOptions {
                poll_timeout: Duration::from_secs(60),
            })),
            client_script: SCRIPT.to_owned(),
            heartbeat: Duration::from_secs(30),
        });
        static_router().with_state(state)
    }

    async fn get(dir: &TempDir, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = router(dir)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_owned());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8_lossy(&body).into_owned())
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(relative_path("/").unwrap(), "");
        assert_eq!(relative_path("/pages/about.html").unwrap(), "pages/about.html");
        assert_eq!(relative_path("/my%20page.html").unwrap(), "my page.html");
    }

    #[test]
    fn test_relative_path_rejects_parent_dir() {
        assert!(matches!(
            relative_path("/../secret"),
            Err(ServerError::InvalidPath(_))
        ));
        assert!(matches!(
            relative_path("/a/%2e%2e/%2e%2e/secret"),
            Err(ServerError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_is_html() {
        assert!(is_html(Path::new("index.html")));
        assert!(is_html(Path::new("OLD.HTM")));
        assert!(!is_html(Path::new("style.css")));
        assert!(!is_html(Path::new("README")));
    }

    #[tokio::test]
    async fn test_root_serves_index_with_script() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<body><h1>Index</h1></body>").unwrap();

        let (status, content_type, body) = get(&dir, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/html; charset=utf-8"));
        assert_eq!(body, format!("<body><h1>Index</h1>{SCRIPT}</body>"));
    }

    #[tokio::test]
    async fn test_directory_serves_its_index() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("pages")).unwrap();
        std::fs::write(dir.path().join("pages/index.html"), "<p>Pages</p>").unwrap();

        let (status, _, body) = get(&dir, "/pages").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, format!("<p>Pages</p>{SCRIPT}"));
    }

    #[tokio::test]
    async fn test_other_files_untouched_with_mime() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("style.css"), "body { color: red }").unwrap();

        let (status, content_type, body) = get(&dir, "/style.css").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/css"));
        assert_eq!(body, "body { color: red }");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();

        let (status, _, body) = get(&dir, "/missing.html").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("missing.html"));
    }

    #[tokio::test]
    async fn test_directory_without_index_is_not_found() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();

        let (status, _, _) = get(&dir, "/empty/").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_parent_dir_is_bad_request() {
        let dir = TempDir::new().unwrap();

        let (status, _, _) = get(&dir, "/%2e%2e/etc/passwd").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
