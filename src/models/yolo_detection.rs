//! Raw detection entity
//!
//! SeaORM entity model for `raw.yolo_detections`, one row per detected
//! object (or one placeholder row with empty class for an image with zero
//! detections).

use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(schema_name = "raw", table_name = "yolo_detections")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Message the detected image belongs to
    pub message_id: i64,

    pub channel_name: String,

    /// Detector class label; empty string for a zero-detection image
    pub detected_class: String,

    pub confidence_score: f64,

    /// Image-level category from the rule-table classifier
    pub image_category: String,

    /// Enrichment run timestamp; the detection fact's incremental high-water mark
    pub scraped_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
