//! Owner context extraction.
//!
//! Payment requests are scoped to the identity that created them. The owner
//! arrives as an opaque `X-User-ID` header set by the fronting gateway after
//! authentication; this service does not manage users itself.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

/// Owner identity extracted from request headers.
#[derive(Debug, Clone)]
pub struct OwnerContext {
    pub user_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for OwnerContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header"))
            })?;

        let span = tracing::Span::current();
        span.record("user_id", user_id);

        Ok(OwnerContext {
            user_id: user_id.to_string(),
        })
    }
}
