//! Bearer-token guard for the HTTP surface.
//!
//! A single shared secret covers every route except the health check.

use axum::{extract::Request, middleware::Next, response::Response};

use crate::{error::ApiError, server::AppState};

/// Resolved gateway auth configuration.
#[derive(Debug, Clone)]
pub struct ResolvedAuth {
    pub token: String,
}

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    // XOR each byte and accumulate; any difference makes result non-zero.
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

/// Extract and check the `Authorization: Bearer <token>` header.
pub fn authorize(auth: &ResolvedAuth, header: Option<&str>) -> Result<(), ApiError> {
    let given = header
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or_default();
    if given.is_empty() || !safe_equal(given, &auth.token) {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// Axum middleware wrapping [`authorize`].
pub(crate) async fn require_bearer(
    axum::extract::State(state): axum::extract::State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    authorize(&state.gateway.auth, header)?;
    Ok(next.run(request).await)
}
