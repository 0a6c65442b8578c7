//! Startup schema creation.
//!
//! All timestamps are RFC3339 TEXT due to SQLite type limitations. Statuses
//! are TEXT with CHECK constraints matching the domain enums' wire strings.

use crate::db::connection::DatabasePool;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        title TEXT,
        prompt TEXT NOT NULL,
        model_tag TEXT NOT NULL,
        reference_assets TEXT NOT NULL DEFAULT '[]',
        auto_continue INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'queued',
        progress INTEGER NOT NULL DEFAULT 0,
        current_phase TEXT,
        error TEXT,
        total_cost_usd REAL NOT NULL DEFAULT 0,
        duration_ms INTEGER NOT NULL DEFAULT 0,
        current_branch TEXT NOT NULL DEFAULT 'main',
        current_checkpoint_id TEXT,
        final_video_path TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS checkpoints (
        id TEXT PRIMARY KEY NOT NULL,
        job_id TEXT NOT NULL REFERENCES jobs(id),
        parent_id TEXT,
        branch TEXT NOT NULL,
        phase INTEGER NOT NULL CHECK (phase BETWEEN 1 AND 4),
        version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'approved', 'superseded')),
        created_at TEXT NOT NULL,
        approved_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_checkpoints_job
        ON checkpoints (job_id, branch, phase)",
    "CREATE TABLE IF NOT EXISTS artifacts (
        id TEXT PRIMARY KEY NOT NULL,
        checkpoint_id TEXT NOT NULL REFERENCES checkpoints(id),
        kind TEXT NOT NULL,
        key TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
        payload TEXT,
        blob_path TEXT,
        content_type TEXT,
        size_bytes INTEGER,
        provider_tag TEXT NOT NULL,
        cost_usd REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (checkpoint_id, kind, key)
    )",
    "CREATE TABLE IF NOT EXISTS costs (
        id TEXT PRIMARY KEY NOT NULL,
        job_id TEXT NOT NULL REFERENCES jobs(id),
        phase INTEGER NOT NULL CHECK (phase BETWEEN 1 AND 4),
        provider TEXT NOT NULL,
        model_tag TEXT NOT NULL,
        usd REAL NOT NULL,
        duration_s REAL NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_costs_job ON costs (job_id)",
];

/// Create all tables and indexes if absent.
pub async fn ensure_schema(pool: &DatabasePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseConnection;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let conn = DatabaseConnection::in_memory().await.unwrap();
        ensure_schema(conn.pool()).await.unwrap();
        ensure_schema(conn.pool()).await.unwrap();
    }

    #[tokio::test]
    async fn test_artifact_uniqueness_enforced() {
        let conn = DatabaseConnection::in_memory().await.unwrap();

        let insert = "INSERT INTO artifacts
            (id, checkpoint_id, kind, key, version, provider_tag, created_at)
            VALUES (?, 'cp-1', 'chunk', 'chunk_00', 1, 'mock', '2026-01-01T00:00:00Z')";
        sqlx::query(insert).bind("a-1").execute(conn.pool()).await.unwrap();
        let dup = sqlx::query(insert).bind("a-2").execute(conn.pool()).await;
        assert!(dup.is_err());
    }
}
