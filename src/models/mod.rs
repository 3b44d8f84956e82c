//! Data models for the medwarehouse service.
//!
//! SeaORM entities exist only for the loader-managed raw tables; the mart
//! tables are created and populated by the transformation layer with plain
//! SQL and read back through `FromQueryResult` projections.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod telegram_message;
pub mod yolo_detection;

pub use telegram_message::Entity as TelegramMessage;
pub use yolo_detection::Entity as YoloDetection;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "medwarehouse".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
