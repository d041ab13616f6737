//! Postgres-backed task store.
//!
//! The conditional update is a single statement:
//!
//! ```sql
//! UPDATE training_tasks SET status = $3, ... WHERE id = $1 AND status = $2
//! ```
//!
//! Postgres row locking makes it atomic: of several concurrent claimers only
//! one sees a returned row; the rest get zero rows and report a
//! `StatusConflict`.
//!
//! ## Sync bridge
//!
//! `TaskStore` is synchronous (the processor and scheduler run on plain
//! threads). The trait impl blocks on the runtime handle given at
//! construction, so it must not be called from inside an async task; use the
//! inherent `async` methods there.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use tracing::instrument;
use uuid::Uuid;

use agritrain_core::{EntryId, TaskId};

use super::store::{TaskStats, TaskStore, TaskStoreError, check_edge};
use super::types::{TaskResult, TaskStatus, TrainingTask, Transition};
use crate::pg::{describe_sqlx_error, sql_limit};

const TASK_COLUMNS: &str =
    "id, subject_id, status, enqueued_at, started_at, completed_at, failed_at, error, result";

#[derive(Debug, Clone)]
pub struct PostgresTaskStore {
    pool: Arc<PgPool>,
    runtime: Handle,
}

impl PostgresTaskStore {
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self {
            pool: Arc::new(pool),
            runtime,
        }
    }

    #[instrument(skip(self, task), fields(task_id = %task.id), err)]
    pub async fn insert_task(&self, task: &TrainingTask) -> Result<(), TaskStoreError> {
        let result = task.result.as_ref().map(result_to_json).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO training_tasks (
                id, subject_id, status, enqueued_at, started_at,
                completed_at, failed_at, error, result
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.subject_id.as_str())
        .bind(task.status.as_str())
        .bind(task.enqueued_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.failed_at)
        .bind(&task.error)
        .bind(result)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TaskStoreError::AlreadyExists(task.id)
            } else {
                storage("insert_task", e)
            }
        })?;

        Ok(())
    }

    #[instrument(skip(self), fields(task_id = %id), err)]
    pub async fn fetch(&self, id: TaskId) -> Result<Option<TrainingTask>, TaskStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM training_tasks WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| storage("fetch", e))?;

        row.map(|r| task_from_row(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_oldest_pending(&self) -> Result<Option<TrainingTask>, TaskStoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM training_tasks
            WHERE status = 'pending'
            ORDER BY enqueued_at ASC, id ASC
            LIMIT 1
            "#
        ))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| storage("fetch_oldest_pending", e))?;

        row.map(|r| task_from_row(&r)).transpose()
    }

    #[instrument(
        skip(self, transition),
        fields(task_id = %id, expected = %expected, target = %transition.target()),
        err
    )]
    pub async fn transition(
        &self,
        id: TaskId,
        expected: TaskStatus,
        transition: Transition,
    ) -> Result<TrainingTask, TaskStoreError> {
        check_edge(expected, &transition)?;
        let target = transition.target();

        let (started_at, completed_at, failed_at, error, result) = match transition {
            Transition::Claim { started_at } => (Some(started_at), None, None, None, None),
            Transition::Complete { completed_at, result } => {
                (None, Some(completed_at), None, None, Some(result_to_json(&result)?))
            }
            Transition::Fail { failed_at, error } => (None, None, Some(failed_at), Some(error), None),
        };

        let row = sqlx::query(&format!(
            r#"
            UPDATE training_tasks
            SET status       = $3,
                started_at   = COALESCE($4, started_at),
                completed_at = COALESCE($5, completed_at),
                failed_at    = COALESCE($6, failed_at),
                error        = COALESCE($7, error),
                result       = COALESCE($8, result)
            WHERE id = $1 AND status = $2
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .bind(target.as_str())
        .bind(started_at)
        .bind(completed_at)
        .bind(failed_at)
        .bind(error)
        .bind(result)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| storage("transition", e))?;

        if let Some(row) = row {
            return task_from_row(&row);
        }

        // Zero rows: either the task is gone or someone else moved it.
        match self.fetch(id).await? {
            Some(current) => Err(TaskStoreError::StatusConflict {
                id,
                expected,
                found: current.status,
            }),
            None => Err(TaskStoreError::NotFound(id)),
        }
    }

    #[instrument(skip(self, task), fields(task_id = %task.id), err)]
    pub async fn overwrite(&self, task: &TrainingTask) -> Result<(), TaskStoreError> {
        let result = task.result.as_ref().map(result_to_json).transpose()?;

        let updated = sqlx::query(
            r#"
            UPDATE training_tasks
            SET subject_id = $3, enqueued_at = $4, started_at = $5,
                completed_at = $6, failed_at = $7, error = $8, result = $9
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.status.as_str())
        .bind(task.subject_id.as_str())
        .bind(task.enqueued_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.failed_at)
        .bind(&task.error)
        .bind(result)
        .execute(&*self.pool)
        .await
        .map_err(|e| storage("overwrite", e))?;

        if updated.rows_affected() == 1 {
            return Ok(());
        }
        match self.fetch(task.id).await? {
            Some(current) => Err(TaskStoreError::StatusConflict {
                id: task.id,
                expected: task.status,
                found: current.status,
            }),
            None => Err(TaskStoreError::NotFound(task.id)),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_by_status(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<TrainingTask>, TaskStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM training_tasks
            WHERE $1::TEXT IS NULL OR status = $1
            ORDER BY enqueued_at ASC, id ASC
            LIMIT $2
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(sql_limit(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| storage("fetch_by_status", e))?;

        rows.iter().map(task_from_row).collect()
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<TrainingTask>, TaskStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM training_tasks
            WHERE status = 'processing' AND started_at < $1
            ORDER BY started_at ASC, id ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| storage("fetch_stale", e))?;

        rows.iter().map(task_from_row).collect()
    }

    #[instrument(skip(self, ids), fields(candidates = ids.len()), err)]
    pub async fn delete_terminal_tasks(&self, ids: &[TaskId]) -> Result<usize, TaskStoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();

        let deleted = sqlx::query(
            r#"
            DELETE FROM training_tasks
            WHERE id = ANY($1) AND status IN ('completed', 'failed')
            "#,
        )
        .bind(&uuids)
        .execute(&*self.pool)
        .await
        .map_err(|e| storage("delete_terminal_tasks", e))?;

        Ok(deleted.rows_affected() as usize)
    }

    #[instrument(skip(self), err)]
    pub async fn count_by_status(&self) -> Result<TaskStats, TaskStoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM training_tasks GROUP BY status")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| storage("count_by_status", e))?;

        let mut stats = TaskStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(|e| storage("count_by_status", e))?;
            let n: i64 = row.try_get("n").map_err(|e| storage("count_by_status", e))?;
            let status: TaskStatus = status
                .parse()
                .map_err(|e: agritrain_core::DomainError| TaskStoreError::Storage(e.to_string()))?;
            let n = n as usize;
            match status {
                TaskStatus::Pending => stats.pending = n,
                TaskStatus::Processing => stats.processing = n,
                TaskStatus::Completed => stats.completed = n,
                TaskStatus::Failed => stats.failed = n,
            }
        }
        Ok(stats)
    }
}

impl TaskStore for PostgresTaskStore {
    fn insert(&self, task: TrainingTask) -> Result<TaskId, TaskStoreError> {
        self.runtime.block_on(self.insert_task(&task))?;
        Ok(task.id)
    }

    fn get(&self, id: TaskId) -> Result<Option<TrainingTask>, TaskStoreError> {
        self.runtime.block_on(self.fetch(id))
    }

    fn oldest_pending(&self) -> Result<Option<TrainingTask>, TaskStoreError> {
        self.runtime.block_on(self.fetch_oldest_pending())
    }

    fn compare_and_transition(
        &self,
        id: TaskId,
        expected: TaskStatus,
        transition: Transition,
    ) -> Result<TrainingTask, TaskStoreError> {
        self.runtime.block_on(self.transition(id, expected, transition))
    }

    fn update(&self, task: &TrainingTask) -> Result<(), TaskStoreError> {
        self.runtime.block_on(self.overwrite(task))
    }

    fn list_by_status(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<TrainingTask>, TaskStoreError> {
        self.runtime.block_on(self.fetch_by_status(status, limit))
    }

    fn processing_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TrainingTask>, TaskStoreError> {
        self.runtime.block_on(self.fetch_stale(cutoff))
    }

    fn delete_terminal(&self, ids: &[TaskId]) -> Result<usize, TaskStoreError> {
        self.runtime.block_on(self.delete_terminal_tasks(ids))
    }

    fn stats(&self) -> Result<TaskStats, TaskStoreError> {
        self.runtime.block_on(self.count_by_status())
    }
}

fn storage(operation: &str, err: sqlx::Error) -> TaskStoreError {
    TaskStoreError::Storage(describe_sqlx_error(operation, err))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn result_to_json(result: &TaskResult) -> Result<serde_json::Value, TaskStoreError> {
    serde_json::to_value(result)
        .map_err(|e| TaskStoreError::Storage(format!("failed to encode task result: {e}")))
}

fn task_from_row(row: &sqlx::postgres::PgRow) -> Result<TrainingTask, TaskStoreError> {
    let decode = |e: sqlx::Error| storage("decode_task_row", e);

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let subject_id: String = row.try_get("subject_id").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let result: Option<serde_json::Value> = row.try_get("result").map_err(decode)?;

    let corrupt = |what: String| TaskStoreError::Storage(format!("corrupt task row {id}: {what}"));

    Ok(TrainingTask {
        id: TaskId::from_uuid(id),
        subject_id: EntryId::new(subject_id).map_err(|e| corrupt(e.to_string()))?,
        status: status.parse().map_err(|e: agritrain_core::DomainError| corrupt(e.to_string()))?,
        enqueued_at: row.try_get("enqueued_at").map_err(decode)?,
        started_at: row.try_get("started_at").map_err(decode)?,
        completed_at: row.try_get("completed_at").map_err(decode)?,
        failed_at: row.try_get("failed_at").map_err(decode)?,
        error: row.try_get("error").map_err(decode)?,
        result: result
            .map(serde_json::from_value::<TaskResult>)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?,
    })
}
