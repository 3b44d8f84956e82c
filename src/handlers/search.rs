//! # Message Search Endpoint Handler
//!
//! Case-insensitive substring search over message text, ordered by view
//! count so the most visible mentions surface first.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, FromQueryResult, Statement};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::bounded_limit;
use crate::error::ApiError;
use crate::server::AppState;

/// Query parameters for message search
#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchMessagesQuery {
    /// Substring to search for (required, non-empty)
    pub query: Option<String>,
    /// Maximum number of messages to return (default: 20, max: 100)
    pub limit: Option<i64>,
}

/// One message matching a search query
#[derive(Debug, Serialize, FromQueryResult, ToSchema)]
pub struct MessageSearchResult {
    pub message_id: i64,
    pub channel_name: String,
    /// Calendar day the message was posted
    pub message_date: NaiveDate,
    pub message_text: Option<String>,
    pub views: i32,
}

/// Search messages containing a keyword, ordered by view count descending.
#[utoipa::path(
    get,
    path = "/search/messages",
    params(SearchMessagesQuery),
    responses(
        (status = 200, description = "Messages matching the query", body = [MessageSearchResult]),
        (status = 400, description = "Invalid query parameters", body = ApiError, example = json!({
            "code": "VALIDATION_FAILED",
            "message": "query must not be empty",
            "trace_id": "corr-12345678"
        })),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "search"
)]
pub async fn search_messages(
    State(state): State<AppState>,
    Query(query): Query<SearchMessagesQuery>,
) -> Result<Json<Vec<MessageSearchResult>>, ApiError> {
    let term = query
        .query
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "query must not be empty",
            )
        })?;
    let limit = bounded_limit(query.limit, 20, 100)?;

    let sql = r#"
        SELECT
            f.message_id,
            c.channel_name,
            d.full_date AS message_date,
            f.message_text,
            f.view_count AS views
        FROM raw_marts.fct_messages f
        JOIN raw_marts.dim_channels c ON f.channel_key = c.channel_key
        JOIN raw_marts.dim_dates d ON f.date_key = d.date_key
        WHERE f.message_text ILIKE '%' || $1 || '%' ESCAPE '\'
        ORDER BY f.view_count DESC
        LIMIT $2
    "#;

    let rows = MessageSearchResult::find_by_statement(Statement::from_sql_and_values(
        state.db.get_database_backend(),
        sql,
        [escape_like(term).into(), limit.into()],
    ))
    .all(&state.db)
    .await?;

    Ok(Json(rows))
}

/// Escape LIKE metacharacters so the user's term matches literally.
pub(crate) fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
