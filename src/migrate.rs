use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Create log files table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log_files (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            size INTEGER NOT NULL,
            uploaded_by TEXT,
            processing_status TEXT NOT NULL,
            entry_count INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL DEFAULT 0,
            warning_count INTEGER NOT NULL DEFAULT 0,
            rca_status TEXT NOT NULL DEFAULT 'not_started',
            active_job_id TEXT,
            parse_error TEXT,
            content_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Entries keep file order through the autoincrement sequence
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log_entries (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            log_file_id TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            level TEXT NOT NULL,
            message TEXT NOT NULL,
            error_code TEXT,
            service TEXT,
            host TEXT,
            metadata_json TEXT NOT NULL DEFAULT 'null',
            FOREIGN KEY (log_file_id) REFERENCES log_files(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            job_type TEXT NOT NULL,
            log_file_id TEXT NOT NULL,
            status TEXT NOT NULL,
            progress INTEGER NOT NULL DEFAULT 0,
            total_chunks INTEGER NOT NULL DEFAULT 0,
            current_chunk INTEGER NOT NULL DEFAULT 0,
            failed_chunk INTEGER,
            failed_chunks_json TEXT NOT NULL DEFAULT '[]',
            result_json TEXT,
            error TEXT,
            started_at INTEGER,
            completed_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create patterns table; `version` drives the optimistic merge
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patterns (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL,
            keywords_json TEXT NOT NULL DEFAULT '[]',
            root_cause TEXT NOT NULL,
            common_fixes_json TEXT NOT NULL DEFAULT '[]',
            severity TEXT NOT NULL,
            occurrence_count INTEGER NOT NULL DEFAULT 1,
            last_seen INTEGER NOT NULL,
            confidence REAL NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            version INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pattern_examples (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            pattern_id TEXT NOT NULL,
            log_file_id TEXT NOT NULL,
            summary TEXT NOT NULL,
            root_cause TEXT NOT NULL,
            error_count INTEGER NOT NULL,
            severity TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            FOREIGN KEY (pattern_id) REFERENCES patterns(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create memories table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS memories (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            log_file_id TEXT,
            summary TEXT NOT NULL,
            root_cause TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            metadata_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create feedback table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedback (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            memory_id TEXT NOT NULL,
            user_id TEXT,
            is_correct INTEGER NOT NULL,
            correction TEXT,
            feedback_type TEXT NOT NULL,
            pattern_name TEXT,
            root_cause_section TEXT,
            confidence_impact REAL NOT NULL DEFAULT 0,
            processed INTEGER NOT NULL DEFAULT 0,
            processed_at INTEGER,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_log_entries_file ON log_entries(log_file_id, seq)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_file_status ON jobs(log_file_id, status)")
        .execute(pool)
        .await?;
    // Backstop for the conditional insert: one active job per log file
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_one_active
        ON jobs(log_file_id) WHERE status IN ('pending', 'running')
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pattern_examples_pattern ON pattern_examples(pattern_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedback_memory ON feedback(memory_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_dims ON memories(dims)")
        .execute(pool)
        .await?;

    Ok(())
}
