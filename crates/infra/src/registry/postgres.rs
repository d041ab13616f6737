//! Postgres-backed model registry.
//!
//! One row in `model_registry`, keyed by [`MODEL_REGISTRY_KEY`]. The version
//! check is part of the write statement, so the swap is atomic.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use tracing::instrument;

use agritrain_core::ExpectedVersion;

use super::store::{ModelRegistry, RegistryError};
use super::types::{MODEL_REGISTRY_KEY, ModelMetadata, ModelRecord};
use crate::pg::describe_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresModelRegistry {
    pool: Arc<PgPool>,
    runtime: Handle,
}

impl PostgresModelRegistry {
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self {
            pool: Arc::new(pool),
            runtime,
        }
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_current(&self) -> Result<Option<ModelRecord>, RegistryError> {
        let row = sqlx::query("SELECT version, metadata, updated_at FROM model_registry WHERE key = $1")
            .bind(MODEL_REGISTRY_KEY)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| storage("fetch_current", e))?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    #[instrument(skip(self, metadata), fields(task_id = %metadata.task_id), err)]
    pub async fn swap(
        &self,
        expected: ExpectedVersion,
        metadata: ModelMetadata,
    ) -> Result<ModelRecord, RegistryError> {
        let payload = serde_json::to_value(&metadata)
            .map_err(|e| RegistryError::Storage(format!("failed to encode model metadata: {e}")))?;
        let now = Utc::now();

        let row = match expected {
            ExpectedVersion::Any => sqlx::query(
                r#"
                INSERT INTO model_registry (key, version, metadata, updated_at)
                VALUES ($1, 1, $2, $3)
                ON CONFLICT (key) DO UPDATE
                SET version = model_registry.version + 1,
                    metadata = EXCLUDED.metadata,
                    updated_at = EXCLUDED.updated_at
                RETURNING version, metadata, updated_at
                "#,
            )
            .bind(MODEL_REGISTRY_KEY)
            .bind(&payload)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await,
            ExpectedVersion::Absent => sqlx::query(
                r#"
                INSERT INTO model_registry (key, version, metadata, updated_at)
                VALUES ($1, 1, $2, $3)
                ON CONFLICT (key) DO NOTHING
                RETURNING version, metadata, updated_at
                "#,
            )
            .bind(MODEL_REGISTRY_KEY)
            .bind(&payload)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await,
            ExpectedVersion::Exact(version) => {
                let version = i64::try_from(version).map_err(|_| {
                    RegistryError::Storage(format!("registry version {version} out of range"))
                })?;
                sqlx::query(
                    r#"
                    UPDATE model_registry
                    SET version = version + 1, metadata = $3, updated_at = $4
                    WHERE key = $1 AND version = $2
                    RETURNING version, metadata, updated_at
                    "#,
                )
                .bind(MODEL_REGISTRY_KEY)
                .bind(version)
                .bind(&payload)
                .bind(now)
                .fetch_optional(&*self.pool)
                .await
            }
        }
        .map_err(|e| storage("swap", e))?;

        match row {
            Some(row) => record_from_row(&row),
            None => {
                let actual = self.fetch_current().await?.map(|r| r.version);
                Err(RegistryError::VersionConflict { expected, actual })
            }
        }
    }
}

impl ModelRegistry for PostgresModelRegistry {
    fn current(&self) -> Result<Option<ModelRecord>, RegistryError> {
        self.runtime.block_on(self.fetch_current())
    }

    fn compare_and_set(
        &self,
        expected: ExpectedVersion,
        metadata: ModelMetadata,
    ) -> Result<ModelRecord, RegistryError> {
        self.runtime.block_on(self.swap(expected, metadata))
    }
}

fn storage(operation: &str, err: sqlx::Error) -> RegistryError {
    RegistryError::Storage(describe_sqlx_error(operation, err))
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<ModelRecord, RegistryError> {
    let decode = |e: sqlx::Error| storage("decode_registry_row", e);

    let version: i64 = row.try_get("version").map_err(decode)?;
    let metadata: serde_json::Value = row.try_get("metadata").map_err(decode)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode)?;

    Ok(ModelRecord {
        version: u64::try_from(version)
            .map_err(|_| RegistryError::Storage(format!("negative registry version {version}")))?,
        metadata: serde_json::from_value(metadata)
            .map_err(|e| RegistryError::Storage(format!("corrupt model metadata: {e}")))?,
        updated_at,
    })
}
