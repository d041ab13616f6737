//! Postgres-backed knowledge base reader.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use tracing::instrument;

use agritrain_core::{EntryId, EntryKind, KnowledgeEntry};

use super::{KnowledgeBase, KnowledgeBaseError};
use crate::pg::describe_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresKnowledgeBase {
    pool: Arc<PgPool>,
    runtime: Handle,
}

impl PostgresKnowledgeBase {
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self {
            pool: Arc::new(pool),
            runtime,
        }
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_all(&self) -> Result<Vec<KnowledgeEntry>, KnowledgeBaseError> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, label, description, image_refs, created_at, updated_at
            FROM knowledge_entries
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| KnowledgeBaseError::Unavailable(describe_sqlx_error("fetch_all", e)))?;

        rows.iter().map(entry_from_row).collect()
    }
}

impl KnowledgeBase for PostgresKnowledgeBase {
    fn list_entries(&self) -> Result<Vec<KnowledgeEntry>, KnowledgeBaseError> {
        self.runtime.block_on(self.fetch_all())
    }
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<KnowledgeEntry, KnowledgeBaseError> {
    let decode =
        |e: sqlx::Error| KnowledgeBaseError::Unavailable(describe_sqlx_error("decode_entry_row", e));

    let id: String = row.try_get("id").map_err(decode)?;
    let kind: String = row.try_get("kind").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode)?;

    let corrupt = |reason: String| KnowledgeBaseError::Corrupt {
        id: id.clone(),
        reason,
    };

    Ok(KnowledgeEntry {
        id: EntryId::new(id.clone()).map_err(|e| corrupt(e.to_string()))?,
        kind: kind
            .parse::<EntryKind>()
            .map_err(|e| corrupt(e.to_string()))?,
        label: row.try_get("label").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        image_refs: row.try_get("image_refs").map_err(decode)?,
        created_at,
        updated_at,
    })
}
