//! Shared helpers for the Postgres adapters.

use sqlx::PgPool;

/// Schema for the task queue, model registry and knowledge entries.
pub const SCHEMA: &str = include_str!("../migrations/0001_training_pipeline.sql");

/// Create the pipeline tables if they do not exist yet.
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

/// Render a SQLx error with the operation it happened in.
///
/// | SQLx Error | Rendering |
/// |------------|-----------|
/// | Database | `database error in {op} ({code}): {message}` |
/// | PoolClosed | `connection pool closed in {op}` |
/// | other | `sqlx error in {op}: {err}` |
pub(crate) fn describe_sqlx_error(operation: &str, err: sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => format!(
                "database error in {operation} ({code}): {}",
                db_err.message()
            ),
            None => format!("database error in {operation}: {}", db_err.message()),
        },
        sqlx::Error::PoolClosed => format!("connection pool closed in {operation}"),
        other => format!("sqlx error in {operation}: {other}"),
    }
}

/// Clamp a `usize` limit into a SQL `LIMIT` parameter.
pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
