//! Reads the single-row `store_metadata` table tracking the logical schema
//! version. The upgrade path is additive only — this exists so an operator
//! or a future migration can tell what shape the store was created with.

use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};

pub struct MetadataRepository;

impl MetadataRepository {
    pub async fn schema_version(pool: &SqlitePool) -> AppResult<String> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM store_metadata WHERE key = 'schema_version'")
                .fetch_optional(pool)
                .await
                .map_err(AppError::Database)?;
        Ok(row.map(|(v,)| v).unwrap_or_else(|| "unknown".to_string()))
    }
}
