//! # API Handlers
//!
//! HTTP endpoint handlers for the analytics API. All endpoints are read-only
//! queries over the star schema; out-of-range parameters are rejected with a
//! validation error rather than silently truncated.

use axum::http::StatusCode;
use axum::response::Json;

use crate::error::ApiError;
use crate::models::ServiceInfo;

pub mod channels;
pub mod reports;
pub mod search;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Validate an optional limit parameter against `1..=max`, rejecting
/// out-of-range values instead of clamping them.
pub(crate) fn bounded_limit(value: Option<i64>, default: i64, max: i64) -> Result<i64, ApiError> {
    let limit = value.unwrap_or(default);
    if limit < 1 || limit > max {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("limit must be between 1 and {}", max),
        ));
    }
    Ok(limit)
}

#[cfg(test)]
mod tests;
