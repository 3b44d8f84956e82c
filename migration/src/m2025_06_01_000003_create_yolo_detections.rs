//! Migration to create the raw.yolo_detections table.
//!
//! Landing table for the detection enricher output. One row per detected
//! object; the unique index over the natural key keeps re-loads of the
//! detection CSV idempotent.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table((RawSchema::Raw, YoloDetections::Table))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(YoloDetections::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(YoloDetections::MessageId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(YoloDetections::ChannelName)
                            .string_len(255)
                            .not_null(),
                    )
                    // Empty string (not NULL) marks an image with zero
                    // detections, so the unique index can still de-dupe it.
                    .col(
                        ColumnDef::new(YoloDetections::DetectedClass)
                            .string_len(100)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(YoloDetections::ConfidenceScore)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(YoloDetections::ImageCategory)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(YoloDetections::ScrapedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_yolo_detections_natural_key ON raw.yolo_detections (message_id, channel_name, detected_class, confidence_score)".to_string(),
            ))
            .await?;

        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_yolo_detections_scraped_at ON raw.yolo_detections (scraped_at DESC)".to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for index in [
            "raw.idx_yolo_detections_natural_key",
            "raw.idx_yolo_detections_scraped_at",
        ] {
            manager
                .get_connection()
                .execute(Statement::from_string(
                    manager.get_database_backend(),
                    format!("DROP INDEX IF EXISTS {}", index),
                ))
                .await?;
        }

        manager
            .drop_table(
                Table::drop()
                    .table((RawSchema::Raw, YoloDetections::Table))
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum RawSchema {
    #[sea_orm(iden = "raw")]
    Raw,
}

#[derive(DeriveIden)]
enum YoloDetections {
    Table,
    Id,
    MessageId,
    ChannelName,
    DetectedClass,
    ConfidenceScore,
    ImageCategory,
    ScrapedAt,
}
