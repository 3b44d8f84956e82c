//! Raw telegram message entity
//!
//! SeaORM entity model for `raw.telegram_messages`, the landing table the
//! raw loader upserts scraped batches into.

use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// One scraped message as landed by the raw loader.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(schema_name = "raw", table_name = "telegram_messages")]
pub struct Model {
    /// Source-assigned message identifier, unique within a channel
    #[sea_orm(primary_key, auto_increment = false)]
    pub message_id: i64,

    /// Channel the message was scraped from
    #[sea_orm(primary_key, auto_increment = false)]
    pub channel_name: String,

    /// Timestamp the message was posted
    pub message_date: DateTimeWithTimeZone,

    /// Message body, if any
    pub message_text: Option<String>,

    /// Whether the message carried media
    pub has_media: bool,

    /// Relative path of the landed image, if one was downloaded
    pub image_path: Option<String>,

    pub views: i32,

    pub forwards: i32,

    /// Timestamp the row was (re)loaded; later loads supersede earlier ones
    pub loaded_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
