//! Migration to create the warehouse schemas.
//!
//! The `raw` schema holds loader-managed landing tables; `raw_marts` holds
//! the staging view and the dimension/fact tables maintained by the
//! transformation layer.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for schema in ["raw", "raw_marts"] {
            manager
                .get_connection()
                .execute(Statement::from_string(
                    manager.get_database_backend(),
                    format!("CREATE SCHEMA IF NOT EXISTS {}", schema),
                ))
                .await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for schema in ["raw_marts", "raw"] {
            manager
                .get_connection()
                .execute(Statement::from_string(
                    manager.get_database_backend(),
                    format!("DROP SCHEMA IF EXISTS {} CASCADE", schema),
                ))
                .await?;
        }
        Ok(())
    }
}
