//! # Channel Activity Endpoint Handler
//!
//! Daily posting activity and engagement for one channel.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, FromQueryResult, Statement};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::server::AppState;

/// Query parameters for the channel activity endpoint
#[derive(Debug, Deserialize, IntoParams)]
pub struct ChannelActivityQuery {
    /// Number of most recent active days to return (default: 30, max: 365)
    pub days: Option<i64>,
}

/// One day of channel activity
#[derive(Debug, Serialize, FromQueryResult, ToSchema)]
pub struct ChannelActivity {
    /// Calendar day the messages were posted
    pub date: NaiveDate,
    /// Messages posted on that day
    pub message_count: i64,
    /// Views summed over that day's messages
    pub total_views: i64,
}

/// Daily message count and total views for a channel, most recent first.
///
/// An unknown channel yields an empty result set, not an error.
#[utoipa::path(
    get,
    path = "/channels/{channel_name}/activity",
    params(
        ("channel_name" = String, Path, description = "Channel name as stored in the channel dimension"),
        ChannelActivityQuery
    ),
    responses(
        (status = 200, description = "Daily activity for the channel", body = [ChannelActivity]),
        (status = 400, description = "Invalid query parameters", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "channels"
)]
pub async fn channel_activity(
    State(state): State<AppState>,
    Path(channel_name): Path<String>,
    Query(query): Query<ChannelActivityQuery>,
) -> Result<Json<Vec<ChannelActivity>>, ApiError> {
    let days = query.days.unwrap_or(30);
    if !(1..=365).contains(&days) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "days must be between 1 and 365",
        ));
    }

    let sql = r#"
        SELECT
            d.full_date AS date,
            COUNT(f.message_id) AS message_count,
            COALESCE(SUM(f.view_count), 0)::bigint AS total_views
        FROM raw_marts.fct_messages f
        JOIN raw_marts.dim_channels c ON f.channel_key = c.channel_key
        JOIN raw_marts.dim_dates d ON f.date_key = d.date_key
        WHERE c.channel_name = $1
        GROUP BY d.full_date
        ORDER BY d.full_date DESC
        LIMIT $2
    "#;

    let rows = ChannelActivity::find_by_statement(Statement::from_sql_and_values(
        state.db.get_database_backend(),
        sql,
        [channel_name.into(), days.into()],
    ))
    .all(&state.db)
    .await?;

    Ok(Json(rows))
}
