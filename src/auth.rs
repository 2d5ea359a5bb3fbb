//! Admin-key header middleware (part of C12).
//!
//! Every route under `/api` except `GET /api/file*` requires a `Key` header
//! matching the configured admin key. Compared in constant time so the
//! check doesn't leak timing information about how much of the key matched.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::state::AppState;

pub async fn require_admin_key(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, AppError> {
    let headers: &HeaderMap = request.headers();
    let provided = headers.get("Key").and_then(|v| v.to_str().ok()).unwrap_or("");

    let expected = state.config.oss.admin_key.as_bytes();
    if provided.as_bytes().ct_eq(expected).into() {
        Ok(next.run(request).await)
    } else {
        Err(AppError::NoPermission)
    }
}
