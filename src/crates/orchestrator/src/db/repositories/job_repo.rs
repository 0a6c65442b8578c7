//! Job repository for database operations.

use crate::db::connection::DatabasePool;
use crate::db::models::JobRow;
use chrono::Utc;
use domain::JobStatus;

/// Fields seeded at job creation.
pub struct NewJob {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub prompt: String,
    pub model_tag: String,
    pub reference_assets: Vec<String>,
    pub auto_continue: bool,
}

/// Job repository.
pub struct JobRepository;

impl JobRepository {
    /// Insert a new job in the `queued` state.
    pub async fn create(pool: &DatabasePool, new: NewJob) -> Result<JobRow, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let assets = serde_json::to_string(&new.reference_assets).unwrap_or_else(|_| "[]".into());
        sqlx::query_as::<_, JobRow>(
            "INSERT INTO jobs (id, user_id, title, prompt, model_tag, reference_assets,
                               auto_continue, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'queued', ?, ?)
             RETURNING *",
        )
        .bind(&new.id)
        .bind(&new.user_id)
        .bind(&new.title)
        .bind(&new.prompt)
        .bind(&new.model_tag)
        .bind(&assets)
        .bind(new.auto_continue as i64)
        .bind(&now)
        .bind(&now)
        .fetch_one(pool)
        .await
    }

    /// Get a job by id.
    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<JobRow>, sqlx::Error> {
        sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's jobs, newest first.
    pub async fn list_by_user(
        pool: &DatabasePool,
        user_id: &str,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Update job status and the derived columns in one statement.
    pub async fn update_status(
        pool: &DatabasePool,
        id: &str,
        status: JobStatus,
        progress: Option<i64>,
        current_phase: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE jobs SET status = ?,
                             progress = COALESCE(?, progress),
                             current_phase = COALESCE(?, current_phase),
                             error = COALESCE(?, error),
                             updated_at = ?
             WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(progress)
        .bind(current_phase)
        .bind(error)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Add provider spend and stage wall-clock to the accumulators.
    pub async fn add_cost(
        pool: &DatabasePool,
        id: &str,
        usd: f64,
        duration_ms: i64,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE jobs SET total_cost_usd = total_cost_usd + ?,
                             duration_ms = duration_ms + ?,
                             updated_at = ?
             WHERE id = ?",
        )
        .bind(usd)
        .bind(duration_ms)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Point the job at its current branch and pending checkpoint.
    pub async fn set_position(
        pool: &DatabasePool,
        id: &str,
        branch: &str,
        checkpoint_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE jobs SET current_branch = ?, current_checkpoint_id = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(branch)
        .bind(checkpoint_id)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record the final video path once refine completes.
    pub async fn set_final_video(
        pool: &DatabasePool,
        id: &str,
        blob_path: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE jobs SET final_video_path = ?, updated_at = ? WHERE id = ?")
            .bind(blob_path)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete a job and every dependent row.
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query(
            "DELETE FROM artifacts WHERE checkpoint_id IN
                (SELECT id FROM checkpoints WHERE job_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM checkpoints WHERE job_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM costs WHERE job_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    /// Jobs left in a running state; consumed by the startup recovery scan
    /// that re-enqueues stages interrupted by a process crash.
    pub async fn list_running(pool: &DatabasePool) -> Result<Vec<JobRow>, sqlx::Error> {
        sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE status LIKE 'running_phase_%' ORDER BY updated_at ASC",
        )
        .fetch_all(pool)
        .await
    }

    /// Jobs in a terminal failed/canceled state older than the idle cutoff;
    /// candidates for blob GC.
    pub async fn list_gc_candidates(
        pool: &DatabasePool,
        updated_before: &str,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs
             WHERE status IN ('failed', 'canceled') AND updated_at < ?",
        )
        .bind(updated_before)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseConnection;
    use domain::Phase;

    fn new_job(id: &str) -> NewJob {
        NewJob {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            title: Some("Morning Rocket".to_string()),
            prompt: "30-second coffee ad".to_string(),
            model_tag: "hailuo_fast".to_string(),
            reference_assets: vec![],
            auto_continue: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let conn = DatabaseConnection::in_memory().await.unwrap();
        let created = JobRepository::create(conn.pool(), new_job("job-1")).await.unwrap();
        assert_eq!(created.status, "queued");
        assert_eq!(created.progress, 0);
        assert_eq!(created.current_branch, "main");

        let fetched = JobRepository::get_by_id(conn.pool(), "job-1").await.unwrap();
        assert_eq!(fetched.map(|j| j.id), Some(created.id));
    }

    #[tokio::test]
    async fn test_update_status_merges_optionals() {
        let conn = DatabaseConnection::in_memory().await.unwrap();
        JobRepository::create(conn.pool(), new_job("job-1")).await.unwrap();

        JobRepository::update_status(
            conn.pool(),
            "job-1",
            JobStatus::Running(Phase::Plan),
            Some(5),
            Some("phase1_plan"),
            None,
        )
        .await
        .unwrap();
        JobRepository::update_status(
            conn.pool(),
            "job-1",
            JobStatus::PausedAt(Phase::Plan),
            Some(10),
            None,
            None,
        )
        .await
        .unwrap();

        let job = JobRepository::get_by_id(conn.pool(), "job-1").await.unwrap().unwrap();
        assert_eq!(job.status, "paused_at_phase_1");
        assert_eq!(job.progress, 10);
        // COALESCE keeps the previously written phase label.
        assert_eq!(job.current_phase.as_deref(), Some("phase1_plan"));
    }

    #[tokio::test]
    async fn test_cost_accumulates() {
        let conn = DatabaseConnection::in_memory().await.unwrap();
        JobRepository::create(conn.pool(), new_job("job-1")).await.unwrap();
        JobRepository::add_cost(conn.pool(), "job-1", 0.25, 1_000).await.unwrap();
        JobRepository::add_cost(conn.pool(), "job-1", 0.50, 2_000).await.unwrap();

        let job = JobRepository::get_by_id(conn.pool(), "job-1").await.unwrap().unwrap();
        assert!((job.total_cost_usd - 0.75).abs() < 1e-9);
        assert_eq!(job.duration_ms, 3_000);
    }

    #[tokio::test]
    async fn test_delete_removes_job() {
        let conn = DatabaseConnection::in_memory().await.unwrap();
        JobRepository::create(conn.pool(), new_job("job-1")).await.unwrap();
        JobRepository::delete(conn.pool(), "job-1").await.unwrap();
        assert!(JobRepository::get_by_id(conn.pool(), "job-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_user_newest_first() {
        let conn = DatabaseConnection::in_memory().await.unwrap();
        JobRepository::create(conn.pool(), new_job("job-1")).await.unwrap();
        JobRepository::create(conn.pool(), new_job("job-2")).await.unwrap();
        let jobs = JobRepository::list_by_user(conn.pool(), "user-1").await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(JobRepository::list_by_user(conn.pool(), "user-2").await.unwrap().is_empty());
    }
}
