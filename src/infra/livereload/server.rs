use std::{
    convert::Infallible,
    io,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_stream::stream;
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, Uri, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::error;

use super::watcher::ReloadNotifier;

pub const LIVERELOAD_PATH: &str = "/__livereload";

const CLIENT_SCRIPT: &str = "<script>(function(){var source=new EventSource(\"/__livereload\");\
source.addEventListener(\"reload\",function(){window.location.reload();});})();</script>";

#[derive(Clone)]
struct ServeState {
    root: Arc<PathBuf>,
    notifier: ReloadNotifier,
}

/// Static file router for `root` plus the reload event stream.
pub fn build_router(root: PathBuf, notifier: ReloadNotifier) -> Router {
    let state = ServeState {
        root: Arc::new(root),
        notifier,
    };

    Router::new()
        .route(LIVERELOAD_PATH, get(livereload_events))
        .fallback(serve_file)
        .with_state(state)
}

async fn livereload_events(
    State(state): State<ServeState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut receiver = state.notifier.subscribe();
    let events = stream! {
        loop {
            match receiver.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    yield Ok::<Event, Infallible>(Event::default().event("reload").data("reload"));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn serve_file(State(state): State<ServeState>, uri: Uri) -> Response {
    let Some(relative) = resolve_request_path(uri.path()) else {
        return not_found();
    };
    let full_path = state.root.join(&relative);

    let bytes = match tokio::fs::read(&full_path).await {
        Ok(bytes) => bytes,
        Err(err) if matches!(err.kind(), io::ErrorKind::NotFound | io::ErrorKind::IsADirectory) => {
            return not_found();
        }
        Err(err) => {
            error!(
                target = "isledoc::livereload",
                path = %full_path.display(),
                error = %err,
                "Failed to read file"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mime = mime_guess::from_path(&full_path).first_or_octet_stream();
    let body = if mime.essence_str() == "text/html" {
        Body::from(inject_client(&String::from_utf8_lossy(&bytes)))
    } else {
        Body::from(bytes)
    };

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Map a request path onto a path relative to the root. Directory requests
/// resolve to their `index.html`; anything that could escape the root is
/// rejected.
fn resolve_request_path(request_path: &str) -> Option<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    let mut relative = PathBuf::from(trimmed);
    if trimmed.is_empty() || trimmed.ends_with('/') {
        relative.push("index.html");
    }

    Path::new(&relative)
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
        .then_some(relative)
}

/// Insert the reload client just before `</body>`, or at the end when the
/// page has no body close tag.
pub(crate) fn inject_client(html: &str) -> String {
    let mut output = String::with_capacity(html.len() + CLIENT_SCRIPT.len());
    match html.rfind("</body>") {
        Some(index) => {
            output.push_str(&html[..index]);
            output.push_str(CLIENT_SCRIPT);
            output.push_str(&html[index..]);
        }
        None => {
            output.push_str(html);
            output.push_str(CLIENT_SCRIPT);
        }
    }
    output
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}
