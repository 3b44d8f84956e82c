//! Raw loaders: landing JSON batches into `raw.telegram_messages` and the
//! enricher CSV into `raw.yolo_detections`.
//!
//! The production path is the idempotent upsert keyed on natural identity;
//! full refresh survives as a bootstrap-only mode that truncates first.
//! A malformed file is logged and skipped, and the run fails only when zero
//! files loaded successfully.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ConnectionTrait, DatabaseConnection, EntityTrait, Statement,
    TransactionTrait,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::detection::{self, DetectionRow, DetectorError};
use crate::landing::{LandingStore, MessageRecord};
use crate::models::telegram_message::{
    ActiveModel as MessageActiveModel, Column as MessageColumn, Entity as MessageEntity,
};
use crate::models::yolo_detection::{
    ActiveModel as DetectionActiveModel, Column as DetectionColumn, Entity as DetectionEntity,
};

/// Rows per INSERT statement, kept well under the Postgres bind limit.
const INSERT_CHUNK: usize = 500;

/// Errors raised by the raw loaders.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("no landing files loaded successfully ({skipped} skipped)")]
    NoFilesLoaded { skipped: usize },
    #[error(transparent)]
    Detections(#[from] DetectorError),
}

/// Load mode for the message loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Insert-or-update keyed by `(message_id, channel_name)`; repeated runs
    /// over overlapping data converge to the same table contents.
    Upsert,
    /// Truncate and reload. Bootstrap only; loses load history.
    FullRefresh,
}

/// Outcome of one message-loader run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub rows_loaded: usize,
    pub rows_rejected: usize,
}

/// Load every landing batch into `raw.telegram_messages`.
pub async fn load_messages(
    db: &DatabaseConnection,
    store: &LandingStore,
    mode: LoadMode,
) -> Result<LoadReport, LoadError> {
    if mode == LoadMode::FullRefresh {
        warn!("full-refresh load: truncating raw.telegram_messages");
        db.execute(Statement::from_string(
            db.get_database_backend(),
            "TRUNCATE TABLE raw.telegram_messages".to_string(),
        ))
        .await?;
    }

    let mut report = LoadReport::default();

    for path in store.discover_batches() {
        let batch = match store.read_batch(&path) {
            Ok(batch) => batch,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping malformed landing file");
                report.files_skipped += 1;
                continue;
            }
        };

        let records = dedup_records(batch.records);
        report.rows_rejected += batch.rejected;

        let txn = db.begin().await?;
        for chunk in records.chunks(INSERT_CHUNK) {
            let models: Vec<MessageActiveModel> =
                chunk.iter().map(message_active_model).collect();
            MessageEntity::insert_many(models)
                .on_conflict(
                    OnConflict::columns([MessageColumn::MessageId, MessageColumn::ChannelName])
                        .update_columns([
                            MessageColumn::MessageDate,
                            MessageColumn::MessageText,
                            MessageColumn::HasMedia,
                            MessageColumn::ImagePath,
                            MessageColumn::Views,
                            MessageColumn::Forwards,
                            MessageColumn::LoadedAt,
                        ])
                        .to_owned(),
                )
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;

        info!(path = %path.display(), rows = records.len(), "loaded landing batch");
        metrics::counter!("loader_rows_total").increment(records.len() as u64);
        report.files_loaded += 1;
        report.rows_loaded += records.len();
    }

    if report.files_loaded == 0 {
        return Err(LoadError::NoFilesLoaded {
            skipped: report.files_skipped,
        });
    }

    info!(
        files_loaded = report.files_loaded,
        files_skipped = report.files_skipped,
        rows_loaded = report.rows_loaded,
        rows_rejected = report.rows_rejected,
        "raw message load complete"
    );
    Ok(report)
}

/// Load the enricher result CSV into `raw.yolo_detections`.
pub async fn load_detections(
    db: &DatabaseConnection,
    results_path: &Path,
) -> Result<usize, LoadError> {
    let rows = dedup_detections(detection::read_results(results_path)?);

    let txn = db.begin().await?;
    for chunk in rows.chunks(INSERT_CHUNK) {
        let models: Vec<DetectionActiveModel> = chunk.iter().map(detection_active_model).collect();
        DetectionEntity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    DetectionColumn::MessageId,
                    DetectionColumn::ChannelName,
                    DetectionColumn::DetectedClass,
                    DetectionColumn::ConfidenceScore,
                ])
                .update_columns([DetectionColumn::ImageCategory, DetectionColumn::ScrapedAt])
                .to_owned(),
            )
            .exec(&txn)
            .await?;
    }
    txn.commit().await?;

    info!(rows = rows.len(), path = %results_path.display(), "loaded detection results");
    Ok(rows.len())
}

fn message_active_model(record: &MessageRecord) -> MessageActiveModel {
    MessageActiveModel {
        message_id: Set(record.message_id),
        channel_name: Set(record.channel_name.clone()),
        message_date: Set(record.message_date.into()),
        message_text: Set(record.message_text.clone()),
        has_media: Set(record.has_media),
        image_path: Set(record.image_path.clone()),
        views: Set(clamp_count(record.views)),
        forwards: Set(clamp_count(record.forwards)),
        loaded_at: Set(Utc::now().into()),
    }
}

fn detection_active_model(row: &DetectionRow) -> DetectionActiveModel {
    DetectionActiveModel {
        message_id: Set(row.message_id),
        channel_name: Set(row.channel_name.clone()),
        detected_class: Set(row.detected_class.clone()),
        confidence_score: Set(row.confidence_score),
        image_category: Set(row.image_category.clone()),
        scraped_at: Set(row.scraped_at.into()),
        ..Default::default()
    }
}

fn clamp_count(value: i64) -> i32 {
    value.clamp(0, i32::MAX as i64) as i32
}

/// Keep one record per (message_id, channel_name); a later record in the
/// same batch supersedes an earlier one, so a single upsert statement never
/// touches the same row twice.
fn dedup_records(records: Vec<MessageRecord>) -> Vec<MessageRecord> {
    let mut by_key: BTreeMap<(i64, String), MessageRecord> = BTreeMap::new();
    for record in records {
        by_key.insert((record.message_id, record.channel_name.clone()), record);
    }
    by_key.into_values().collect()
}

/// Keep one detection row per natural key within a single load.
fn dedup_detections(rows: Vec<DetectionRow>) -> Vec<DetectionRow> {
    let mut by_key: BTreeMap<(i64, String, String, String), DetectionRow> = BTreeMap::new();
    for row in rows {
        let key = (
            row.message_id,
            row.channel_name.clone(),
            row.detected_class.clone(),
            format!("{:.6}", row.confidence_score),
        );
        by_key.insert(key, row);
    }
    by_key.into_values().collect()
}
