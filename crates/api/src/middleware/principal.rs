//! Principal extraction for Axum handlers.
//!
//! The service sits behind a gateway that authenticates callers and forwards
//! the caller identity in the `X-Principal-Id` header. This extractor trusts
//! that header; requests without it are rejected with 401.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use quarry_core::error::CoreError;

use crate::error::AppError;

/// Header carrying the authenticated caller identity.
pub const PRINCIPAL_HEADER: &str = "x-principal-id";

/// The authenticated caller, extracted from `X-Principal-Id`.
///
/// Use this as an extractor parameter in any handler that requires a caller
/// identity:
///
/// ```ignore
/// async fn my_handler(principal: Principal) -> AppResult<Json<()>> {
///     tracing::info!(principal = %principal.id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing X-Principal-Id header".into(),
                ))
            })?;

        Ok(Principal { id: id.to_string() })
    }
}
