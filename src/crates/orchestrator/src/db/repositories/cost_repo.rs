//! Cost ledger repository.

use crate::db::connection::DatabasePool;
use crate::db::models::CostRow;
use chrono::Utc;
use uuid::Uuid;

/// Cost ledger repository.
pub struct CostRepository;

impl CostRepository {
    /// Record one provider call's cost.
    pub async fn insert(
        pool: &DatabasePool,
        job_id: &str,
        phase: i64,
        provider: &str,
        model_tag: &str,
        usd: f64,
        duration_s: f64,
    ) -> Result<CostRow, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query_as::<_, CostRow>(
            "INSERT INTO costs (id, job_id, phase, provider, model_tag, usd, duration_s, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(job_id)
        .bind(phase)
        .bind(provider)
        .bind(model_tag)
        .bind(usd)
        .bind(duration_s)
        .bind(&now)
        .fetch_one(pool)
        .await
    }

    /// All ledger rows for a job, oldest first.
    pub async fn list_by_job(pool: &DatabasePool, job_id: &str) -> Result<Vec<CostRow>, sqlx::Error> {
        sqlx::query_as::<_, CostRow>(
            "SELECT * FROM costs WHERE job_id = ? ORDER BY created_at ASC",
        )
        .bind(job_id)
        .fetch_all(pool)
        .await
    }

    /// Total spend for a job.
    pub async fn total_by_job(pool: &DatabasePool, job_id: &str) -> Result<f64, sqlx::Error> {
        let row: (Option<f64>,) = sqlx::query_as("SELECT SUM(usd) FROM costs WHERE job_id = ?")
            .bind(job_id)
            .fetch_one(pool)
            .await?;
        Ok(row.0.unwrap_or(0.0))
    }
}
