//! Artifact repository for database operations.

use crate::db::models::ArtifactRow;
use chrono::Utc;
use sqlx::{Executor, Sqlite};

/// Column values for inserting or updating one artifact version.
pub struct ArtifactWrite<'a> {
    pub payload: Option<&'a str>,
    pub blob_path: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub size_bytes: Option<i64>,
    pub provider_tag: &'a str,
    pub cost_usd: f64,
}

/// Artifact repository.
pub struct ArtifactRepository;

impl ArtifactRepository {
    /// Insert version 1 of an artifact. Fails on duplicate
    /// (checkpoint, kind, key).
    pub async fn insert<'e, E>(
        exec: E,
        id: &str,
        checkpoint_id: &str,
        kind: &str,
        key: &str,
        write: ArtifactWrite<'_>,
    ) -> Result<ArtifactRow, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().to_rfc3339();
        sqlx::query_as::<_, ArtifactRow>(
            "INSERT INTO artifacts (id, checkpoint_id, kind, key, version, payload, blob_path,
                                    content_type, size_bytes, provider_tag, cost_usd, created_at)
             VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(id)
        .bind(checkpoint_id)
        .bind(kind)
        .bind(key)
        .bind(write.payload)
        .bind(write.blob_path)
        .bind(write.content_type)
        .bind(write.size_bytes)
        .bind(write.provider_tag)
        .bind(write.cost_usd)
        .bind(&now)
        .fetch_one(exec)
        .await
    }

    /// Replace an artifact's content in place, incrementing its version.
    pub async fn bump_version<'e, E>(
        exec: E,
        artifact_id: &str,
        write: ArtifactWrite<'_>,
    ) -> Result<ArtifactRow, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().to_rfc3339();
        sqlx::query_as::<_, ArtifactRow>(
            "UPDATE artifacts SET version = version + 1,
                                  payload = ?,
                                  blob_path = ?,
                                  content_type = ?,
                                  size_bytes = ?,
                                  provider_tag = ?,
                                  cost_usd = ?,
                                  created_at = ?
             WHERE id = ?
             RETURNING *",
        )
        .bind(write.payload)
        .bind(write.blob_path)
        .bind(write.content_type)
        .bind(write.size_bytes)
        .bind(write.provider_tag)
        .bind(write.cost_usd)
        .bind(&now)
        .bind(artifact_id)
        .fetch_one(exec)
        .await
    }

    /// Get by id.
    pub async fn get_by_id<'e, E>(exec: E, id: &str) -> Result<Option<ArtifactRow>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ArtifactRow>("SELECT * FROM artifacts WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await
    }

    /// Look up one artifact by its (checkpoint, kind, key) identity.
    pub async fn find<'e, E>(
        exec: E,
        checkpoint_id: &str,
        kind: &str,
        key: &str,
    ) -> Result<Option<ArtifactRow>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ArtifactRow>(
            "SELECT * FROM artifacts WHERE checkpoint_id = ? AND kind = ? AND key = ?",
        )
        .bind(checkpoint_id)
        .bind(kind)
        .bind(key)
        .fetch_optional(exec)
        .await
    }

    /// All artifacts on a checkpoint, ordered by (kind, key).
    pub async fn list_by_checkpoint<'e, E>(
        exec: E,
        checkpoint_id: &str,
    ) -> Result<Vec<ArtifactRow>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ArtifactRow>(
            "SELECT * FROM artifacts WHERE checkpoint_id = ? ORDER BY kind ASC, key ASC",
        )
        .bind(checkpoint_id)
        .fetch_all(exec)
        .await
    }

    /// True when any artifact on the checkpoint has version > 1.
    pub async fn has_version_above_one<'e, E>(
        exec: E,
        checkpoint_id: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM artifacts WHERE checkpoint_id = ? AND version > 1",
        )
        .bind(checkpoint_id)
        .fetch_one(exec)
        .await?;
        Ok(row.0 > 0)
    }

    /// Every blob path referenced by a job's artifacts.
    pub async fn list_blob_paths_by_job<'e, E>(
        exec: E,
        job_id: &str,
    ) -> Result<Vec<String>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT a.blob_path FROM artifacts a
             JOIN checkpoints c ON c.id = a.checkpoint_id
             WHERE c.job_id = ? AND a.blob_path IS NOT NULL",
        )
        .bind(job_id)
        .fetch_all(exec)
        .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseConnection;
    use crate::db::repositories::{CheckpointRepository, JobRepository};
    use crate::db::repositories::job_repo::NewJob;

    async fn seed(conn: &DatabaseConnection) {
        JobRepository::create(
            conn.pool(),
            NewJob {
                id: "job-1".to_string(),
                user_id: "user-1".to_string(),
                title: None,
                prompt: "p".to_string(),
                model_tag: "hailuo_fast".to_string(),
                reference_assets: vec![],
                auto_continue: false,
            },
        )
        .await
        .unwrap();
        CheckpointRepository::create(conn.pool(), "cp-1", "job-1", None, "main", 1, 1)
            .await
            .unwrap();
    }

    fn spec_write(payload: &str) -> ArtifactWrite<'_> {
        ArtifactWrite {
            payload: Some(payload),
            blob_path: None,
            content_type: Some("application/json"),
            size_bytes: None,
            provider_tag: "mock-planner",
            cost_usd: 0.03,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_identity() {
        let conn = DatabaseConnection::in_memory().await.unwrap();
        seed(&conn).await;

        ArtifactRepository::insert(conn.pool(), "a-1", "cp-1", "spec", "spec", spec_write("{}"))
            .await
            .unwrap();
        let dup =
            ArtifactRepository::insert(conn.pool(), "a-2", "cp-1", "spec", "spec", spec_write("{}"))
                .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_bump_version_increments_monotonically() {
        let conn = DatabaseConnection::in_memory().await.unwrap();
        seed(&conn).await;

        let created = ArtifactRepository::insert(
            conn.pool(),
            "a-1",
            "cp-1",
            "spec",
            "spec",
            spec_write(r#"{"v":1}"#),
        )
        .await
        .unwrap();
        assert_eq!(created.version, 1);

        let v2 = ArtifactRepository::bump_version(conn.pool(), "a-1", spec_write(r#"{"v":2}"#))
            .await
            .unwrap();
        assert_eq!(v2.version, 2);
        let v3 = ArtifactRepository::bump_version(conn.pool(), "a-1", spec_write(r#"{"v":3}"#))
            .await
            .unwrap();
        assert_eq!(v3.version, 3);
        assert_eq!(v3.payload.as_deref(), Some(r#"{"v":3}"#));
    }

    #[tokio::test]
    async fn test_has_version_above_one() {
        let conn = DatabaseConnection::in_memory().await.unwrap();
        seed(&conn).await;
        ArtifactRepository::insert(conn.pool(), "a-1", "cp-1", "spec", "spec", spec_write("{}"))
            .await
            .unwrap();
        assert!(!ArtifactRepository::has_version_above_one(conn.pool(), "cp-1").await.unwrap());
        ArtifactRepository::bump_version(conn.pool(), "a-1", spec_write("{}")).await.unwrap();
        assert!(ArtifactRepository::has_version_above_one(conn.pool(), "cp-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_blob_paths_by_job() {
        let conn = DatabaseConnection::in_memory().await.unwrap();
        seed(&conn).await;
        ArtifactRepository::insert(
            conn.pool(),
            "a-1",
            "cp-1",
            "chunk",
            "chunk_00",
            ArtifactWrite {
                payload: None,
                blob_path: Some("user-1/videos/job-1/main/cp-1/chunk/chunk_00_v1.mp4"),
                content_type: Some("video/mp4"),
                size_bytes: Some(1024),
                provider_tag: "mock-video",
                cost_usd: 0.1,
            },
        )
        .await
        .unwrap();
        let paths = ArtifactRepository::list_blob_paths_by_job(conn.pool(), "job-1")
            .await
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].contains("chunk_00_v1.mp4"));
    }
}
