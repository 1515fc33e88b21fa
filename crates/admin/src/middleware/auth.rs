//! Shared-secret authentication for API routes.
//!
//! Callers send the configured key in the `x-api-key` header. The value must
//! match exactly.

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Extractor that rejects requests without the right API key.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(_: RequireApiKey) -> &'static str {
///     "ok"
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireApiKey;

impl FromRequestParts<AppState> for RequireApiKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing API key".to_string()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("invalid API key".to_string()))?;

        if provided == state.api_key().expose_secret() {
            Ok(Self)
        } else {
            tracing::warn!(path = %parts.uri.path(), "Rejected request with wrong API key");
            Err(AppError::Unauthorized("invalid API key".to_string()))
        }
    }
}

/// Middleware form of [`RequireApiKey`], for layering over a whole router.
pub async fn require_api_key(_: RequireApiKey, request: Request, next: Next) -> Response {
    next.run(request).await
}
