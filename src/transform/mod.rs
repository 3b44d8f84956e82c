//! Transformation layer: declarative SQL stages from the raw tables to the
//! star schema in `raw_marts`.
//!
//! Stages run in dependency order: staging view, channel/date dimensions,
//! then the message and detection facts. Dimensions are fully recomputed on
//! every run; the facts support incremental execution keyed on a high-water
//! mark and converge under re-runs because every surrogate key is derived
//! deterministically from the natural key.

pub mod quality;

use chrono::{DateTime, FixedOffset, NaiveDate};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{AppConfig, ChannelRule};

pub use quality::{CheckOutcome, Severity, run_checks};

/// Errors raised by the transformation layer.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("{} data-quality check(s) failed", .failures.len())]
    QualityChecksFailed { failures: Vec<CheckOutcome> },
}

/// Scope of one transformation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Rebuild the facts from the full staging history.
    Full,
    /// Process only rows newer than the stored high-water mark.
    Incremental,
}

/// Row counts per stage for one transformation run.
#[derive(Debug, Default)]
pub struct TransformReport {
    pub dim_channel_rows: u64,
    pub dim_date_rows: u64,
    pub fct_message_rows: u64,
    pub fct_detection_rows: u64,
    pub checks: Vec<CheckOutcome>,
}

/// Runs the SQL stages against the warehouse.
pub struct Transformer<'a> {
    db: &'a DatabaseConnection,
    config: &'a AppConfig,
}

impl<'a> Transformer<'a> {
    pub fn new(db: &'a DatabaseConnection, config: &'a AppConfig) -> Self {
        Self { db, config }
    }

    /// Run every stage, then the data-quality checks. A failing
    /// error-severity check fails the run.
    pub async fn run(&self, mode: RunMode) -> Result<TransformReport, TransformError> {
        let mut report = TransformReport::default();

        self.build_staging().await?;
        report.dim_channel_rows = self.build_dim_channels().await?;
        report.dim_date_rows = self.build_dim_dates().await?;
        report.fct_message_rows = self.build_fct_messages(mode).await?;
        report.fct_detection_rows = self.build_fct_image_detections(mode).await?;

        report.checks = run_checks(self.db).await?;
        let failures: Vec<CheckOutcome> = report
            .checks
            .iter()
            .filter(|outcome| outcome.severity == Severity::Error && outcome.violations > 0)
            .cloned()
            .collect();
        for outcome in &report.checks {
            if outcome.violations > 0 {
                warn!(
                    check = outcome.name,
                    violations = outcome.violations,
                    sample_ids = ?outcome.sample_ids,
                    "data-quality check found violating rows"
                );
            }
        }
        if !failures.is_empty() {
            return Err(TransformError::QualityChecksFailed { failures });
        }

        info!(
            dim_channels = report.dim_channel_rows,
            dim_dates = report.dim_date_rows,
            fct_messages = report.fct_message_rows,
            fct_image_detections = report.fct_detection_rows,
            "transformation run complete"
        );
        Ok(report)
    }

    /// Staging view over the raw messages: typed columns, collapsed
    /// whitespace, derived length/image flags, and dedup by
    /// `(message_id, channel_name)` keeping the most recently loaded row.
    /// Rows missing the message id, channel, or date never enter staging.
    async fn build_staging(&self) -> Result<(), TransformError> {
        self.exec(
            r#"
            CREATE OR REPLACE VIEW raw_marts.stg_telegram_messages AS
            WITH ranked AS (
                SELECT
                    message_id,
                    channel_name,
                    message_date,
                    NULLIF(btrim(regexp_replace(message_text, '\s+', ' ', 'g')), '')
                        AS message_text,
                    has_media,
                    image_path,
                    views,
                    forwards,
                    loaded_at,
                    ROW_NUMBER() OVER (
                        PARTITION BY message_id, channel_name
                        ORDER BY loaded_at DESC
                    ) AS load_rank
                FROM raw.telegram_messages
                WHERE message_id IS NOT NULL
                  AND channel_name IS NOT NULL
                  AND btrim(channel_name) <> ''
                  AND message_date IS NOT NULL
            )
            SELECT
                message_id,
                channel_name,
                message_date,
                message_text,
                COALESCE(length(message_text), 0) AS message_length,
                views,
                forwards,
                has_media,
                image_path,
                (
                    image_path IS NOT NULL
                    AND lower(btrim(image_path)) NOT IN ('', 'null', 'none')
                ) AS has_image,
                loaded_at
            FROM ranked
            WHERE load_rank = 1
            "#,
        )
        .await?;
        Ok(())
    }

    /// Channel dimension, fully recomputed each run from staging aggregates.
    async fn build_dim_channels(&self) -> Result<u64, TransformError> {
        self.exec("DROP TABLE IF EXISTS raw_marts.dim_channels")
            .await?;
        let sql = format!(
            r#"
            CREATE TABLE raw_marts.dim_channels AS
            SELECT
                {key} AS channel_key,
                channel_name,
                {channel_type} AS channel_type,
                MIN(message_date)::date AS first_post_date,
                MAX(message_date)::date AS last_post_date,
                COUNT(*) AS total_posts,
                ROUND(COALESCE(AVG(views), 0)::numeric, 2) AS avg_views
            FROM raw_marts.stg_telegram_messages
            GROUP BY channel_name
            "#,
            key = surrogate_key_expr("channel_name"),
            channel_type = channel_type_case(
                &self.config.warehouse.channel_rules,
                &self.config.warehouse.default_channel_type,
            ),
        );
        let rows = self.exec(&sql).await?;
        self.exec("ALTER TABLE raw_marts.dim_channels ADD PRIMARY KEY (channel_key)")
            .await?;
        Ok(rows)
    }

    /// Date dimension, generated from the configured range independent of
    /// observed data. `date_key` is the date as an 8-digit integer.
    async fn build_dim_dates(&self) -> Result<u64, TransformError> {
        self.exec("DROP TABLE IF EXISTS raw_marts.dim_dates").await?;
        let rows = self
            .exec_with(
                r#"
                CREATE TABLE raw_marts.dim_dates AS
                SELECT
                    to_char(d, 'YYYYMMDD')::int AS date_key,
                    d::date AS full_date,
                    EXTRACT(ISODOW FROM d)::int AS day_of_week,
                    trim(to_char(d, 'Day')) AS day_name,
                    EXTRACT(WEEK FROM d)::int AS week_of_year,
                    EXTRACT(MONTH FROM d)::int AS month,
                    trim(to_char(d, 'Month')) AS month_name,
                    EXTRACT(QUARTER FROM d)::int AS quarter,
                    EXTRACT(YEAR FROM d)::int AS year,
                    EXTRACT(ISODOW FROM d) IN (6, 7) AS is_weekend,
                    EXTRACT(ISODOW FROM d) NOT IN (6, 7) AS is_business_day
                FROM generate_series($1::date, $2::date, interval '1 day') AS d
                "#,
                vec![
                    self.config.warehouse.date_dim_start.into(),
                    self.config.warehouse.date_dim_end.into(),
                ],
            )
            .await?;
        self.exec("ALTER TABLE raw_marts.dim_dates ADD PRIMARY KEY (date_key)")
            .await?;
        Ok(rows)
    }

    /// Message fact: staging joined to both dimensions on natural keys, with
    /// the `-1` sentinel substituted on a join miss so no key is ever null.
    async fn build_fct_messages(&self, mode: RunMode) -> Result<u64, TransformError> {
        self.exec(
            r#"
            CREATE TABLE IF NOT EXISTS raw_marts.fct_messages (
                message_id bigint NOT NULL,
                channel_key bigint NOT NULL,
                date_key int NOT NULL,
                message_text text,
                message_length int NOT NULL,
                view_count int NOT NULL,
                forward_count int NOT NULL,
                has_image boolean NOT NULL,
                image_path text,
                PRIMARY KEY (message_id, channel_key)
            )
            "#,
        )
        .await?;

        let high_water = match mode {
            RunMode::Full => {
                self.exec("TRUNCATE TABLE raw_marts.fct_messages").await?;
                None
            }
            RunMode::Incremental => self.fct_messages_high_water().await?,
        };

        let insert = r#"
            INSERT INTO raw_marts.fct_messages (
                message_id, channel_key, date_key, message_text, message_length,
                view_count, forward_count, has_image, image_path
            )
            SELECT
                s.message_id,
                COALESCE(c.channel_key, -1) AS channel_key,
                COALESCE(d.date_key, -1) AS date_key,
                s.message_text,
                s.message_length,
                s.views,
                s.forwards,
                s.has_image,
                s.image_path
            FROM raw_marts.stg_telegram_messages s
            LEFT JOIN raw_marts.dim_channels c ON s.channel_name = c.channel_name
            LEFT JOIN raw_marts.dim_dates d ON s.message_date::date = d.full_date
        "#;

        let rows = match high_water {
            Some(mark) => {
                info!(high_water = %mark, "incremental fct_messages run");
                self.exec_with(
                    &format!(
                        "{insert} WHERE s.message_date::date >= $1 \
                         ON CONFLICT (message_id, channel_key) DO NOTHING"
                    ),
                    vec![mark.into()],
                )
                .await?
            }
            None => {
                self.exec(&format!(
                    "{insert} ON CONFLICT (message_id, channel_key) DO NOTHING"
                ))
                .await?
            }
        };
        Ok(rows)
    }

    /// Detection fact: raw detections joined to the message fact. Rows below
    /// the noise floor are discarded before rows below the verified
    /// threshold are downgraded to `unverified`. The zero-detection
    /// placeholder row (empty class) bypasses both gates so images whose
    /// category is `other` stay represented.
    pub async fn build_fct_image_detections(&self, mode: RunMode) -> Result<u64, TransformError> {
        self.exec(
            r#"
            CREATE TABLE IF NOT EXISTS raw_marts.fct_image_detections (
                detection_id bigint NOT NULL PRIMARY KEY,
                message_id bigint NOT NULL,
                channel_key bigint NOT NULL,
                date_key int NOT NULL,
                detected_class varchar(255) NOT NULL,
                confidence_score double precision NOT NULL,
                image_category varchar(50) NOT NULL,
                scraped_at timestamptz NOT NULL
            )
            "#,
        )
        .await?;

        let high_water = match mode {
            RunMode::Full => {
                self.exec("TRUNCATE TABLE raw_marts.fct_image_detections")
                    .await?;
                None
            }
            RunMode::Incremental => self.fct_detections_high_water().await?,
        };

        let insert = format!(
            r#"
            INSERT INTO raw_marts.fct_image_detections (
                detection_id, message_id, channel_key, date_key,
                detected_class, confidence_score, image_category, scraped_at
            )
            SELECT
                {detection_key} AS detection_id,
                r.message_id,
                COALESCE(m.channel_key, -1) AS channel_key,
                COALESCE(m.date_key, -1) AS date_key,
                r.detected_class,
                r.confidence_score,
                CASE
                    WHEN r.detected_class <> '' AND r.confidence_score < $1
                        THEN 'unverified'
                    ELSE r.image_category
                END AS image_category,
                r.scraped_at
            FROM raw.yolo_detections r
            LEFT JOIN raw_marts.dim_channels c ON r.channel_name = c.channel_name
            LEFT JOIN raw_marts.fct_messages m
                ON r.message_id = m.message_id
               AND m.channel_key = COALESCE(c.channel_key, -1)
            WHERE (r.detected_class = '' OR r.confidence_score >= $2)
            "#,
            detection_key = surrogate_key_expr(
                "r.message_id::text || ':' || r.detected_class || ':' || r.confidence_score::text"
            ),
        );

        let verified: Value = self.config.detector.verified_threshold.into();
        let floor: Value = self.config.detector.confidence_floor.into();
        let rows = match high_water {
            Some(mark) => {
                info!(high_water = %mark, "incremental fct_image_detections run");
                self.exec_with(
                    &format!(
                        "{insert} AND r.scraped_at > $3 \
                         ON CONFLICT (detection_id) DO NOTHING"
                    ),
                    vec![verified, floor, mark.into()],
                )
                .await?
            }
            None => {
                self.exec_with(
                    &format!("{insert} ON CONFLICT (detection_id) DO NOTHING"),
                    vec![verified, floor],
                )
                .await?
            }
        };
        Ok(rows)
    }

    /// Latest fact date reachable through `date_key`; sentinel rows carry no
    /// date and are excluded, so an all-sentinel table restarts from scratch.
    async fn fct_messages_high_water(&self) -> Result<Option<NaiveDate>, TransformError> {
        let row = self
            .db
            .query_one(Statement::from_string(
                self.db.get_database_backend(),
                r#"
                SELECT MAX(d.full_date) AS high_water
                FROM raw_marts.fct_messages f
                JOIN raw_marts.dim_dates d ON f.date_key = d.date_key
                "#
                .to_string(),
            ))
            .await?;
        Ok(row
            .and_then(|row| row.try_get::<Option<NaiveDate>>("", "high_water").ok())
            .flatten())
    }

    async fn fct_detections_high_water(
        &self,
    ) -> Result<Option<DateTime<FixedOffset>>, TransformError> {
        let row = self
            .db
            .query_one(Statement::from_string(
                self.db.get_database_backend(),
                "SELECT MAX(scraped_at) AS high_water FROM raw_marts.fct_image_detections"
                    .to_string(),
            ))
            .await?;
        Ok(row
            .and_then(|row| {
                row.try_get::<Option<DateTime<FixedOffset>>>("", "high_water")
                    .ok()
            })
            .flatten())
    }

    async fn exec(&self, sql: &str) -> Result<u64, TransformError> {
        let result = self
            .db
            .execute(Statement::from_string(
                self.db.get_database_backend(),
                sql.to_string(),
            ))
            .await?;
        Ok(result.rows_affected())
    }

    async fn exec_with(&self, sql: &str, values: Vec<Value>) -> Result<u64, TransformError> {
        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                sql,
                values,
            ))
            .await?;
        Ok(result.rows_affected())
    }
}

/// Deterministic 60-bit surrogate key from a natural-key expression. Fifteen
/// hex digits keep the value positive and well inside `bigint`.
fn surrogate_key_expr(natural_key: &str) -> String {
    format!("('x' || substr(md5({natural_key}), 1, 15))::bit(60)::bigint")
}

/// Ordered channel classification rules rendered as a SQL CASE expression,
/// first match wins, configured default otherwise.
fn channel_type_case(rules: &[ChannelRule], default_label: &str) -> String {
    let mut sql = String::from("CASE");
    for rule in rules {
        sql.push_str(&format!(
            " WHEN lower(channel_name) LIKE '%{}%' THEN '{}'",
            escape_literal(&rule.keyword),
            escape_literal(&rule.label)
        ));
    }
    sql.push_str(&format!(" ELSE '{}' END", escape_literal(default_label)));
    sql
}

fn escape_literal(raw: &str) -> String {
    raw.replace('\'', "''")
}
