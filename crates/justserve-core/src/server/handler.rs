//! Request handling for the file server.
//!
//! Authentication runs as a layer in front of [`handle`]. Everything else
//! is decided here, in order: upload, single-file mode, ZIP export,
//! listing, static file.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{FromRequest, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::Multipart;
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::error::{ApiError, ApiResult};
use super::pages;
use super::paths::{encode_href, RequestPath};
use super::ServeConfig;
use crate::archive;

/// Form field carrying the uploaded file.
pub const UPLOAD_FIELD: &str = "file";

/// Fallback handler serving every path under the root.
pub async fn handle(State(config): State<Arc<ServeConfig>>, request: Request) -> Response {
    let result = if request.method() == Method::POST
        && !config.is_single_file()
        && config.allow_upload()
    {
        upload(&config, request).await
    } else if request.method() == Method::GET || request.method() == Method::HEAD {
        serve(&config, request).await
    } else {
        Err(ApiError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
        ))
    };

    result.unwrap_or_else(IntoResponse::into_response)
}

async fn serve(config: &ServeConfig, request: Request) -> ApiResult<Response> {
    let path = RequestPath::parse(request.uri().path())
        .ok_or_else(|| ApiError::bad_request("Invalid path"))?;

    if config.is_single_file() {
        return serve_single_file(config, &path, request).await;
    }

    let target = path.resolve(config.root());
    let is_dir = tokio::fs::metadata(&target)
        .await
        .is_ok_and(|m| m.is_dir());

    if !is_dir {
        return Ok(serve_static(&target, request).await);
    }

    if !path.is_root() && !path.has_trailing_slash() {
        let mut location = path.slash_terminated_href();
        if let Some(query) = request.uri().query() {
            location.push('?');
            location.push_str(query);
        }
        return Ok((StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response());
    }

    if wants_zip(request.uri().query()) {
        let name = target
            .file_name()
            .map_or_else(|| "archive".to_string(), |n| n.to_string_lossy().into_owned());
        tracing::info!("Streaming ZIP of {}", target.display());
        return Ok(zip_response(&target, &format!("{name}.zip")));
    }

    let dir = target.clone();
    let entries = tokio::task::spawn_blocking(move || pages::list_entries(&dir))
        .await
        .map_err(|e| ApiError::internal(format!("listing task failed: {e}")))?
        .map_err(|e| {
            tracing::warn!("Unable to read directory {}: {}", target.display(), e);
            ApiError::internal("Unable to read directory")
        })?;

    Ok(Html(pages::render_listing(&path.display(), &entries, config.allow_upload())).into_response())
}

async fn serve_single_file(
    config: &ServeConfig,
    path: &RequestPath,
    request: Request,
) -> ApiResult<Response> {
    let shown = path.display();
    if shown == "/" || shown == "/index.html" {
        let size = tokio::fs::metadata(config.root())
            .await
            .map_err(|_| ApiError::not_found())?
            .len();
        return Ok(Html(pages::render_file_page(config.file_name(), size)).into_response());
    }

    if shown.strip_prefix('/') == Some(config.file_name()) {
        return Ok(serve_static(config.root(), request).await);
    }

    Err(ApiError::not_found())
}

/// Hand the request to `tower-http`, which handles conditional and range
/// requests.
async fn serve_static(path: &Path, request: Request) -> Response {
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

fn wants_zip(query: Option<&str>) -> bool {
    query.is_some_and(|q| q.split('&').any(|pair| pair == "download=zip"))
}

/// Streamed ZIP response without a length.
pub(crate) fn zip_response(dir: &Path, file_name: &str) -> Response {
    let mut response = Response::new(archive::zip_body(dir));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    if let Some(value) = attachment(file_name) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

/// `Content-Disposition: attachment` for `file_name`.
pub(crate) fn attachment(file_name: &str) -> Option<HeaderValue> {
    let ascii: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    HeaderValue::from_str(&format!(
        "attachment; filename=\"{ascii}\"; filename*=UTF-8''{}",
        encode_href(file_name)
    ))
    .ok()
}

async fn upload(config: &ServeConfig, request: Request) -> ApiResult<Response> {
    let redirect_to = request.uri().path().to_string();

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ApiError::bad_request(format!("Error parsing form: {e}")))?;

    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Error parsing form: {e}")))?
            .ok_or_else(|| ApiError::bad_request("Error retrieving file"))?;

        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .and_then(upload_file_name)
            .ok_or_else(|| ApiError::bad_request("Error retrieving file"))?;
        let dest = config.root().join(&file_name);

        store_field(field, &dest).await?;
        tracing::info!("Received upload {}", dest.display());
        return Ok(Redirect::to(&redirect_to).into_response());
    }
}

async fn store_field(mut field: axum_extra::extract::multipart::Field, dest: &Path) -> ApiResult<()> {
    let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
        tracing::warn!("Unable to create {}: {}", dest.display(), e);
        ApiError::internal("Unable to create the file for writing")
    })?;

    let written: ApiResult<()> = async {
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::bad_request(format!("Error parsing form: {e}")))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| ApiError::internal(format!("Error saving file: {e}")))?;
        }
        file.flush()
            .await
            .map_err(|e| ApiError::internal(format!("Error saving file: {e}")))
    }
    .await;

    if written.is_err() {
        drop(file);
        if let Err(e) = tokio::fs::remove_file(dest).await {
            tracing::warn!("Failed to remove partial upload {}: {}", dest.display(), e);
        }
    }
    written
}

/// Last path component of a client-supplied file name, whichever separator
/// the client used.
fn upload_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}
