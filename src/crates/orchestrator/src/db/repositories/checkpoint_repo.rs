//! Checkpoint repository for database operations.
//!
//! Methods are generic over the executor so the checkpoint store can run
//! them inside a transaction; passing the pool directly also works.

use crate::db::models::CheckpointRow;
use chrono::Utc;
use sqlx::{Executor, Sqlite};

/// Checkpoint repository.
pub struct CheckpointRepository;

impl CheckpointRepository {
    /// Insert a new checkpoint.
    #[allow(clippy::too_many_arguments)]
    pub async fn create<'e, E>(
        exec: E,
        id: &str,
        job_id: &str,
        parent_id: Option<&str>,
        branch: &str,
        phase: i64,
        version: i64,
    ) -> Result<CheckpointRow, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().to_rfc3339();
        sqlx::query_as::<_, CheckpointRow>(
            "INSERT INTO checkpoints (id, job_id, parent_id, branch, phase, version, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)
             RETURNING *",
        )
        .bind(id)
        .bind(job_id)
        .bind(parent_id)
        .bind(branch)
        .bind(phase)
        .bind(version)
        .bind(&now)
        .fetch_one(exec)
        .await
    }

    /// Get a checkpoint by id.
    pub async fn get_by_id<'e, E>(exec: E, id: &str) -> Result<Option<CheckpointRow>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, CheckpointRow>("SELECT * FROM checkpoints WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await
    }

    /// The single pending checkpoint for (job, branch, phase), if any.
    pub async fn find_pending<'e, E>(
        exec: E,
        job_id: &str,
        branch: &str,
        phase: i64,
    ) -> Result<Option<CheckpointRow>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, CheckpointRow>(
            "SELECT * FROM checkpoints
             WHERE job_id = ? AND branch = ? AND phase = ? AND status = 'pending'
             ORDER BY version DESC LIMIT 1",
        )
        .bind(job_id)
        .bind(branch)
        .bind(phase)
        .fetch_optional(exec)
        .await
    }

    /// List checkpoints for a job, optionally restricted to one branch,
    /// ordered by (phase, created_at).
    pub async fn list_by_job<'e, E>(
        exec: E,
        job_id: &str,
        branch: Option<&str>,
    ) -> Result<Vec<CheckpointRow>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        match branch {
            Some(branch) => {
                sqlx::query_as::<_, CheckpointRow>(
                    "SELECT * FROM checkpoints WHERE job_id = ? AND branch = ?
                     ORDER BY phase ASC, created_at ASC",
                )
                .bind(job_id)
                .bind(branch)
                .fetch_all(exec)
                .await
            }
            None => {
                sqlx::query_as::<_, CheckpointRow>(
                    "SELECT * FROM checkpoints WHERE job_id = ?
                     ORDER BY phase ASC, created_at ASC",
                )
                .bind(job_id)
                .fetch_all(exec)
                .await
            }
        }
    }

    /// Distinct branch names for a job.
    pub async fn list_branches<'e, E>(exec: E, job_id: &str) -> Result<Vec<String>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT branch FROM checkpoints WHERE job_id = ? ORDER BY branch ASC",
        )
        .bind(job_id)
        .fetch_all(exec)
        .await?;
        Ok(rows.into_iter().map(|(b,)| b).collect())
    }

    /// Highest existing version for (job, branch, phase), 0 when none.
    pub async fn max_version<'e, E>(
        exec: E,
        job_id: &str,
        branch: &str,
        phase: i64,
    ) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(version) FROM checkpoints WHERE job_id = ? AND branch = ? AND phase = ?",
        )
        .bind(job_id)
        .bind(branch)
        .bind(phase)
        .fetch_one(exec)
        .await?;
        Ok(row.0.unwrap_or(0))
    }

    /// Mark a checkpoint approved; idempotent.
    pub async fn approve<'e, E>(exec: E, id: &str) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE checkpoints SET status = 'approved', approved_at = COALESCE(approved_at, ?)
             WHERE id = ?",
        )
        .bind(&now)
        .bind(id)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Supersede every non-superseded sibling of `keep_id` on the same
    /// (job, branch, phase).
    pub async fn supersede_siblings<'e, E>(
        exec: E,
        job_id: &str,
        branch: &str,
        phase: i64,
        keep_id: &str,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE checkpoints SET status = 'superseded'
             WHERE job_id = ? AND branch = ? AND phase = ? AND id != ?
               AND status != 'superseded'",
        )
        .bind(job_id)
        .bind(branch)
        .bind(phase)
        .bind(keep_id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected())
    }
}
