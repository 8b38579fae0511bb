//! HTTP routes of a P2P session server.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /` | landing page with a download button |
//! | `GET /p2p/info` | [`TransferInfo`] as JSON, CORS-open |
//! | `GET /p2p/download` | the file, or a ZIP of the folder |
//! | `HEAD /p2p/download` | download headers only |

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};

use super::progress::CountingWriter;
use super::{SessionHandle, TransferInfo};
use crate::archive::{self, STREAM_BUFFER_SIZE};
use crate::server::{handler::attachment, pages};

pub(crate) fn router(session: SessionHandle) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/p2p/info", get(info))
        .route("/p2p/download", get(download))
        .with_state(session)
}

async fn landing(State(session): State<SessionHandle>) -> Html<String> {
    let meta = session.meta();
    Html(pages::render_transfer_page(
        &meta.file_name,
        meta.file_size,
        meta.is_dir,
        &meta.code,
    ))
}

async fn info(State(session): State<SessionHandle>) -> impl IntoResponse {
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(TransferInfo::from(session.meta())),
    )
}

/// Streams the payload. `HEAD` answers with the same headers and leaves the
/// session untouched.
async fn download(method: Method, State(session): State<SessionHandle>) -> Response {
    let meta = session.meta().clone();
    let head_only = method == Method::HEAD;

    if meta.is_dir {
        let body = if head_only {
            Body::empty()
        } else {
            zip_download(session, meta.file_path.clone())
        };

        let mut response = Response::new(body);
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
        if let Some(value) = attachment(&format!("{}.zip", meta.file_name)) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
        return response;
    }

    let (len, body) = if head_only {
        match tokio::fs::metadata(&meta.file_path).await {
            Ok(m) => (m.len(), Body::empty()),
            Err(e) => return open_failed(&meta.file_path, &e),
        }
    } else {
        let file = match tokio::fs::File::open(&meta.file_path).await {
            Ok(file) => file,
            Err(e) => return open_failed(&meta.file_path, &e),
        };
        let len = file
            .metadata()
            .await
            .map_or(meta.file_size, |m| m.len());
        (len, file_download(session, file.into_std().await))
    };

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Some(value) = attachment(&meta.file_name) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

fn zip_download(session: SessionHandle, dir: PathBuf) -> Body {
    let download = session.begin_download();
    archive::writer_body(move |sink| {
        let counting = CountingWriter::new(sink, |n| session.progress(download, n));
        let mut out = BufWriter::with_capacity(STREAM_BUFFER_SIZE, counting);
        let result = archive::write_zip(&dir, &mut out).and_then(|()| out.flush());
        session.finish(download, &result);
        result
    })
}

fn file_download(session: SessionHandle, mut file: std::fs::File) -> Body {
    let download = session.begin_download();
    archive::writer_body(move |sink| {
        let counting = CountingWriter::new(sink, |n| session.progress(download, n));
        let mut out = BufWriter::with_capacity(STREAM_BUFFER_SIZE, counting);
        let result = io::copy(&mut file, &mut out).and_then(|_| out.flush());
        session.finish(download, &result);
        result
    })
}

fn open_failed(path: &Path, err: &io::Error) -> Response {
    tracing::warn!("Failed to open {}: {}", path.display(), err);
    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to open file").into_response()
}
