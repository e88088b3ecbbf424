//! Static asset server for the run workspace

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Content type for a served file, from a fixed extension table
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("html") | Some("htm") => "text/html",
        _ => "application/octet-stream",
    }
}

/// Router serving files below `root`
pub fn router(root: impl Into<PathBuf>) -> Router {
    Router::new()
        .fallback(serve_file)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(root.into()))
}

async fn serve_file(State(root): State<Arc<PathBuf>>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Some(file_path) = map_request_path(&root, uri.path()) else {
        return not_found();
    };

    match tokio::fs::read(&file_path).await {
        Ok(bytes) => {
            debug!("Serving {} ({} bytes)", file_path.display(), bytes.len());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type_for(&file_path))],
                bytes,
            )
                .into_response()
        }
        Err(_) => not_found(),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

/// Join the percent-decoded request path onto the root; `None` for paths that
/// would leave it
fn map_request_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    for segment in request_path.split('/') {
        let segment = urlencoding::decode(segment).ok()?;
        if segment.contains(['/', '\\', '\0']) {
            return None;
        }
        match segment.as_ref() {
            "" | "." => {}
            ".." => return None,
            part => out.push(part),
        }
    }
    Some(out)
}

/// Percent-encode each segment of a workspace-relative path for use in a URL
pub fn url_path(relative: &str) -> String {
    relative
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Handle to the running static server
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
    closed: Option<bool>,
}

impl ServerHandle {
    /// Serve `root` on an OS-assigned port of `host`
    pub async fn start(root: &Path, host: &str) -> HarnessResult<Self> {
        let listener = TcpListener::bind((host, 0))
            .await
            .map_err(|e| HarnessError::Server(format!("failed to bind {}:0: {}", host, e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| HarnessError::Server(format!("failed to get server address: {}", e)))?;

        let (tx, rx) = oneshot::channel::<()>();
        let app = router(root);
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
        });

        info!("Serving {} on http://{}", root.display(), addr);

        Ok(Self {
            addr,
            shutdown: Some(tx),
            task: Some(task),
            closed: None,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop the listener; `true` when shutdown completed without error.
    ///
    /// Only the first call stops anything, later calls return its result.
    pub async fn close(&mut self) -> bool {
        if let Some(result) = self.closed {
            return result;
        }

        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        let result = match self.task.take() {
            Some(task) => match task.await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!("Static server on {} stopped with error: {}", self.addr, e);
                    false
                }
                Err(e) => {
                    warn!("Static server task on {} failed: {}", self.addr, e);
                    false
                }
            },
            None => true,
        };

        info!("Static server on {} closed", self.addr);
        self.closed = Some(result);
        result
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn content_types_follow_extension_table() {
        assert_eq!(content_type_for(Path::new("a/mount.js")), "application/javascript");
        assert_eq!(content_type_for(Path::new("a/App.story.css")), "text/css");
        assert_eq!(content_type_for(Path::new("data.JSON")), "application/json");
        assert_eq!(content_type_for(Path::new("mount.html")), "text/html");
        assert_eq!(content_type_for(Path::new("legacy.htm")), "text/html");
        assert_eq!(content_type_for(Path::new("logo.png")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("LICENSE")), "application/octet-stream");
    }

    #[test]
    fn request_paths_stay_below_root() {
        let root = Path::new("/tmp/ws");
        assert_eq!(
            map_request_path(root, "/tests/App.story.js"),
            Some(PathBuf::from("/tmp/ws/tests/App.story.js"))
        );
        assert_eq!(map_request_path(root, "/a/../../etc/passwd"), None);
        assert_eq!(
            map_request_path(root, "/tests/My%20App.story.js"),
            Some(PathBuf::from("/tmp/ws/tests/My App.story.js"))
        );
        assert_eq!(map_request_path(root, "/tests/%2E%2E/%2E%2E/etc/passwd"), None);
        assert_eq!(map_request_path(root, "/tests/..%2F..%2Fetc/passwd"), None);
        assert_eq!(map_request_path(root, "/tests/%FF.js"), None);
    }

    #[test]
    fn url_paths_encode_each_segment() {
        assert_eq!(url_path("tests/App.story.js"), "tests/App.story.js");
        assert_eq!(url_path("tests/My App.story.js"), "tests/My%20App.story.js");
        assert_eq!(url_path("tests/Über.story.css"), "tests/%C3%9Cber.story.css");
    }

    #[tokio::test]
    async fn router_decodes_request_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tests")).unwrap();
        std::fs::write(dir.path().join("tests/My App.story.js"), "export default 1;").unwrap();
        let app = router(dir.path());

        let res = app
            .oneshot(Request::get("/tests/My%20App.story.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/javascript");
    }

    #[tokio::test]
    async fn router_serves_files_and_404s() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mount.html"), "<div id=\"root\"></div>").unwrap();
        let app = router(dir.path());

        let res = app
            .clone()
            .oneshot(Request::get("/mount.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/html");

        let res = app
            .clone()
            .oneshot(Request::get("/missing.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app
            .oneshot(Request::post("/mount.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = ServerHandle::start(dir.path(), "127.0.0.1").await.unwrap();
        assert_ne!(server.port(), 0);

        assert!(server.close().await);
        assert!(server.close().await);
    }
}
