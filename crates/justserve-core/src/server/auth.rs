//! HTTP Basic authentication gate.
//!
//! Any username is accepted. Only the password is checked.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;

use super::error::ApiError;
use crate::crypto::password_matches;

/// Middleware rejecting requests without the configured password.
pub async fn require_password(
    State(password): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Response {
    match basic_password(request.headers()) {
        Some(supplied) if password_matches(&supplied, &password) => next.run(request).await,
        Some(_) => {
            tracing::debug!("Rejected request with wrong password: {}", request.uri());
            ApiError::unauthorized().into_response()
        }
        None => ApiError::unauthorized().into_response(),
    }
}

/// Extract the password half of `Authorization: Basic ...`.
fn basic_password(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (_user, password) = decoded.split_once(':')?;
    Some(password.to_string())
}
