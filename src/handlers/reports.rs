//! # Report Endpoint Handlers
//!
//! Aggregate reports over the star schema: term frequency across message
//! text and per-channel visual-content statistics.

use axum::{
    extract::{Query, State},
    response::Json,
};
use sea_orm::{ConnectionTrait, FromQueryResult, Statement};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::bounded_limit;
use crate::error::ApiError;
use crate::server::AppState;

/// Query parameters for the top-products report
#[derive(Debug, Deserialize, IntoParams)]
pub struct TopProductsQuery {
    /// Maximum number of terms to return (default: 10, max: 100)
    pub limit: Option<i64>,
}

/// One frequently mentioned product term
#[derive(Debug, Serialize, FromQueryResult, ToSchema)]
pub struct TopProduct {
    /// Normalized product term extracted from message text
    #[schema(example = "paracetamol")]
    pub product_term: String,
    /// Number of messages mentioning the term
    pub mention_count: i64,
}

/// Per-channel visual-content statistics
#[derive(Debug, Serialize, FromQueryResult, ToSchema)]
pub struct VisualContentStats {
    pub channel_name: String,
    pub total_messages: i64,
    pub messages_with_images: i64,
    /// Share of messages carrying an image, in percent
    pub image_percentage: f64,
    pub promotional_count: i64,
    pub product_display_count: i64,
}

/// Most frequently mentioned product terms across all channels.
///
/// Splits message text into words, drops known non-product words, and keeps
/// terms matching pharmaceutical/cosmetic suffix patterns.
#[utoipa::path(
    get,
    path = "/reports/top-products",
    params(TopProductsQuery),
    responses(
        (status = 200, description = "Top product terms by mention count", body = [TopProduct]),
        (status = 400, description = "Invalid query parameters", body = ApiError, example = json!({
            "code": "VALIDATION_FAILED",
            "message": "limit must be between 1 and 100",
            "trace_id": "corr-12345678"
        })),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "reports"
)]
pub async fn top_products(
    State(state): State<AppState>,
    Query(query): Query<TopProductsQuery>,
) -> Result<Json<Vec<TopProduct>>, ApiError> {
    let limit = bounded_limit(query.limit, 10, 100)?;

    let sql = r#"
        WITH words AS (
            SELECT
                LOWER(regexp_replace(
                    unnest(regexp_split_to_array(message_text, '[\s\/\-\,\.\(\)]+')),
                    '[^a-z]', '', 'gi'
                )) AS word
            FROM raw_marts.fct_messages
            WHERE message_text IS NOT NULL AND message_text <> ''
        ),
        filtered_counts AS (
            SELECT word, COUNT(*) AS count
            FROM words
            WHERE LENGTH(word) > 3
              AND word NOT IN (
                  'birr', 'delivery', 'monday', 'tuesday', 'wednesday', 'thursday',
                  'friday', 'saturday', 'sunday', 'available', 'price', 'fixed',
                  'address', 'phone', 'location', 'station', 'around', 'front',
                  'school', 'plaza', 'mall', 'bole', 'medhanialem', 'cmc', 'ayat',
                  'gerji', 'legetafo', 'machine', 'furniture', 'urine', 'uterine',
                  'online', 'outline', 'deadline', 'headline', 'timeline', 'routine',
                  'magazine', 'gasoline', 'engine', 'alcohol', 'control', 'please',
                  'message', 'thanks', 'contact', 'stock', 'store', 'inbox'
              )
              AND (
                  word LIKE '%ine' OR
                  word LIKE '%ol' OR
                  word LIKE '%acid' OR
                  word LIKE '%derm%' OR
                  word LIKE '%vit%' OR
                  word LIKE '%cream%' OR
                  word LIKE '%serum%' OR
                  word LIKE '%gel' OR
                  word LIKE '%caine' OR
                  word LIKE '%sone' OR
                  word LIKE '%zole'
              )
            GROUP BY word
        )
        SELECT word AS product_term, count AS mention_count
        FROM filtered_counts
        WHERE word <> ''
        ORDER BY count DESC
        LIMIT $1
    "#;

    let rows = TopProduct::find_by_statement(Statement::from_sql_and_values(
        state.db.get_database_backend(),
        sql,
        [limit.into()],
    ))
    .all(&state.db)
    .await?;

    Ok(Json(rows))
}

/// Image usage and detection-category statistics per channel.
#[utoipa::path(
    get,
    path = "/reports/visual-content",
    responses(
        (status = 200, description = "Per-channel visual-content statistics", body = [VisualContentStats]),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "reports"
)]
pub async fn visual_content(
    State(state): State<AppState>,
) -> Result<Json<Vec<VisualContentStats>>, ApiError> {
    let sql = r#"
        WITH channel_stats AS (
            SELECT
                c.channel_name,
                COUNT(DISTINCT f.message_id) AS total_messages,
                COUNT(DISTINCT CASE WHEN f.has_image THEN f.message_id END)
                    AS messages_with_images,
                COUNT(CASE WHEN i.image_category = 'promotional' THEN 1 END)
                    AS promotional_count,
                COUNT(CASE WHEN i.image_category = 'product_display' THEN 1 END)
                    AS product_display_count
            FROM raw_marts.fct_messages f
            JOIN raw_marts.dim_channels c ON f.channel_key = c.channel_key
            LEFT JOIN raw_marts.fct_image_detections i
                ON f.message_id = i.message_id AND f.channel_key = i.channel_key
            GROUP BY c.channel_name
        )
        SELECT
            channel_name,
            total_messages,
            messages_with_images,
            COALESCE(
                ROUND(100.0 * messages_with_images / NULLIF(total_messages, 0), 2),
                0
            )::float8 AS image_percentage,
            promotional_count,
            product_display_count
        FROM channel_stats
        ORDER BY image_percentage DESC
    "#;

    let rows = VisualContentStats::find_by_statement(Statement::from_string(
        state.db.get_database_backend(),
        sql.to_string(),
    ))
    .all(&state.db)
    .await?;

    Ok(Json(rows))
}
