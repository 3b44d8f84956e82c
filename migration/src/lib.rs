//! Database migrations for the medwarehouse service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000001_create_schemas;
mod m2025_06_01_000002_create_telegram_messages;
mod m2025_06_01_000003_create_yolo_detections;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000001_create_schemas::Migration),
            Box::new(m2025_06_01_000002_create_telegram_messages::Migration),
            Box::new(m2025_06_01_000003_create_yolo_detections::Migration),
        ]
    }
}
