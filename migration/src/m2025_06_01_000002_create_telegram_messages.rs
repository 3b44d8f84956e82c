//! Migration to create the raw.telegram_messages table.
//!
//! This is the landing table the raw loader upserts scraped message batches
//! into. The unique index on (message_id, channel_name) backs the upsert and
//! makes repeated loads over overlapping landing files converge.

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
                    .table((RawSchema::Raw, TelegramMessages::Table))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TelegramMessages::MessageId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TelegramMessages::ChannelName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TelegramMessages::MessageDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TelegramMessages::MessageText).text().null())
                    .col(
                        ColumnDef::new(TelegramMessages::HasMedia)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(TelegramMessages::ImagePath).text().null())
                    .col(
                        ColumnDef::new(TelegramMessages::Views)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TelegramMessages::Forwards)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TelegramMessages::LoadedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(TelegramMessages::MessageId)
                            .col(TelegramMessages::ChannelName),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for channel/date scans used by the staging view
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_telegram_messages_channel_date ON raw.telegram_messages (channel_name, message_date DESC)".to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "DROP INDEX IF EXISTS raw.idx_telegram_messages_channel_date".to_string(),
            ))
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .table((RawSchema::Raw, TelegramMessages::Table))
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
enum TelegramMessages {
    Table,
    MessageId,
    ChannelName,
    MessageDate,
    MessageText,
    HasMedia,
    ImagePath,
    Views,
    Forwards,
    LoadedAt,
}
