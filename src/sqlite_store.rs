//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the schema created by
//! [`migrate::apply`](crate::migrate::apply). Nested values (keyword lists,
//! fixes, job results, metadata) are stored as JSON text and embeddings as
//! little-endian `f32` BLOBs; both convert back to typed values here and
//! nowhere else.
//!
//! # Atomic operations
//!
//! - `create_job_if_idle` is a single `INSERT ... SELECT ... WHERE NOT EXISTS`
//!   statement, so the active-job check and the insert cannot interleave
//!   with another writer. A partial unique index backs it up.
//! - `merge_pattern` is an optimistic compare-and-swap on the `version`
//!   column. The read happens outside the write transaction; the first
//!   statement of the transaction is the guarded write, and a lost race
//!   simply retries from the read.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use autolog_core::analysis::FindingSeverity;
use autolog_core::embedding::Embedding;
use autolog_core::learning::{merge_into, new_pattern};
use autolog_core::models::{
    new_id, now_ts, ExampleSnapshot, Feedback, Job, JobReport, LogEntry, LogFile, Memory,
    MemoryMetadata, MergeOutcome, Pattern, PatternCandidate, PatternExample, PatternMetadata,
    RcaStatus, ScoredMemory,
};
use autolog_core::store::Store;

/// Attempts before a contended pattern merge gives up.
const MAX_MERGE_ATTEMPTS: usize = 16;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn pattern_row_by_name(&self, name: &str) -> Result<Option<(Pattern, i64)>> {
        let row = sqlx::query(&format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| pattern_from_row(&r)).transpose()
    }
}

const FILE_COLUMNS: &str = "id, filename, size, uploaded_by, processing_status, entry_count, \
     error_count, warning_count, rca_status, active_job_id, parse_error, content_hash, \
     created_at, updated_at";

const JOB_COLUMNS: &str = "id, job_type, log_file_id, status, progress, total_chunks, \
     current_chunk, failed_chunk, failed_chunks_json, result_json, error, started_at, \
     completed_at, created_at, updated_at";

const PATTERN_COLUMNS: &str = "id, name, description, keywords_json, root_cause, \
     common_fixes_json, severity, occurrence_count, last_seen, confidence, metadata_json, \
     version, created_at, updated_at";

const MEMORY_COLUMNS: &str =
    "id, log_file_id, summary, root_cause, embedding, metadata_json, created_at";

const FEEDBACK_COLUMNS: &str = "id, memory_id, user_id, is_correct, correction, feedback_type, \
     pattern_name, root_cause_section, confidence_impact, processed, processed_at, created_at";

fn file_from_row(row: &SqliteRow) -> Result<LogFile> {
    let processing_status: String = row.try_get("processing_status")?;
    let rca_status: String = row.try_get("rca_status")?;
    Ok(LogFile {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        size: row.try_get("size")?,
        uploaded_by: row.try_get("uploaded_by")?,
        processing_status: processing_status.parse()?,
        entry_count: row.try_get("entry_count")?,
        error_count: row.try_get("error_count")?,
        warning_count: row.try_get("warning_count")?,
        rca_status: rca_status.parse()?,
        active_job_id: row.try_get("active_job_id")?,
        parse_error: row.try_get("parse_error")?,
        content_hash: row.try_get("content_hash")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<LogEntry> {
    let timestamp_ms: i64 = row.try_get("timestamp_ms")?;
    let level: String = row.try_get("level")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    Ok(LogEntry {
        id: row.try_get("id")?,
        log_file_id: row.try_get("log_file_id")?,
        timestamp: DateTime::from_timestamp_millis(timestamp_ms)
            .ok_or_else(|| anyhow!("invalid entry timestamp: {}", timestamp_ms))?,
        level: level.parse()?,
        message: row.try_get("message")?,
        error_code: row.try_get("error_code")?,
        service: row.try_get("service")?,
        host: row.try_get("host")?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
    })
}

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let status: String = row.try_get("status")?;
    let progress: i64 = row.try_get("progress")?;
    let total_chunks: i64 = row.try_get("total_chunks")?;
    let current_chunk: i64 = row.try_get("current_chunk")?;
    let failed_chunk: Option<i64> = row.try_get("failed_chunk")?;
    let failed_chunks_json: String = row.try_get("failed_chunks_json")?;
    let result_json: Option<String> = row.try_get("result_json")?;

    let result = match result_json {
        Some(json) => Some(serde_json::from_str::<JobReport>(&json)?),
        None => None,
    };

    Ok(Job {
        id: row.try_get("id")?,
        job_type: row.try_get("job_type")?,
        log_file_id: row.try_get("log_file_id")?,
        status: status.parse()?,
        progress: progress.clamp(0, 100) as u8,
        total_chunks: total_chunks.max(0) as usize,
        current_chunk: current_chunk.max(0) as usize,
        failed_chunk: failed_chunk.map(|c| c.max(0) as usize),
        failed_chunks: serde_json::from_str(&failed_chunks_json)?,
        result,
        error: row.try_get("error")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn pattern_from_row(row: &SqliteRow) -> Result<(Pattern, i64)> {
    let keywords_json: String = row.try_get("keywords_json")?;
    let fixes_json: String = row.try_get("common_fixes_json")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let severity: String = row.try_get("severity")?;
    let occurrence_count: i64 = row.try_get("occurrence_count")?;

    let pattern = Pattern {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        keywords: serde_json::from_str(&keywords_json)?,
        root_cause: row.try_get("root_cause")?,
        common_fixes: serde_json::from_str(&fixes_json)?,
        severity: FindingSeverity::normalize(&severity),
        occurrence_count: occurrence_count.clamp(1, u32::MAX as i64) as u32,
        last_seen: row.try_get("last_seen")?,
        confidence: row.try_get("confidence")?,
        metadata: serde_json::from_str::<PatternMetadata>(&metadata_json)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    };
    Ok((pattern, row.try_get("version")?))
}

fn example_from_row(row: &SqliteRow) -> Result<PatternExample> {
    let severity: String = row.try_get("severity")?;
    let error_count: i64 = row.try_get("error_count")?;
    Ok(PatternExample {
        id: row.try_get("id")?,
        pattern_id: row.try_get("pattern_id")?,
        snapshot: ExampleSnapshot {
            log_file_id: row.try_get("log_file_id")?,
            summary: row.try_get("summary")?,
            root_cause: row.try_get("root_cause")?,
            error_count: error_count.clamp(0, u32::MAX as i64) as u32,
            severity: FindingSeverity::normalize(&severity),
            timestamp: row.try_get("timestamp")?,
        },
    })
}

fn memory_from_row(row: &SqliteRow) -> Result<Memory> {
    let blob: Vec<u8> = row.try_get("embedding")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    Ok(Memory {
        id: row.try_get("id")?,
        log_file_id: row.try_get("log_file_id")?,
        summary: row.try_get("summary")?,
        root_cause: row.try_get("root_cause")?,
        embedding: Embedding::from_blob(&blob),
        metadata: serde_json::from_str::<MemoryMetadata>(&metadata_json)?,
        created_at: row.try_get("created_at")?,
    })
}

fn feedback_from_row(row: &SqliteRow) -> Result<Feedback> {
    let feedback_type: String = row.try_get("feedback_type")?;
    Ok(Feedback {
        id: row.try_get("id")?,
        memory_id: row.try_get("memory_id")?,
        user_id: row.try_get("user_id")?,
        is_correct: row.try_get("is_correct")?,
        correction: row.try_get("correction")?,
        feedback_type: feedback_type.parse()?,
        pattern_name: row.try_get("pattern_name")?,
        root_cause_section: row.try_get("root_cause_section")?,
        confidence_impact: row.try_get("confidence_impact")?,
        processed: row.try_get("processed")?,
        processed_at: row.try_get("processed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn insert_example(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    pattern_id: &str,
    snapshot: &ExampleSnapshot,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO pattern_examples (id, pattern_id, log_file_id, summary, root_cause,
                                      error_count, severity, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new_id())
    .bind(pattern_id)
    .bind(&snapshot.log_file_id)
    .bind(&snapshot.summary)
    .bind(&snapshot.root_cause)
    .bind(snapshot.error_count as i64)
    .bind(snapshot.severity.as_str())
    .bind(snapshot.timestamp)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_log_file(&self, file: &LogFile, entries: &[LogEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO log_files ({FILE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&file.id)
        .bind(&file.filename)
        .bind(file.size)
        .bind(&file.uploaded_by)
        .bind(file.processing_status.as_str())
        .bind(file.entry_count)
        .bind(file.error_count)
        .bind(file.warning_count)
        .bind(file.rca_status.as_str())
        .bind(&file.active_job_id)
        .bind(&file.parse_error)
        .bind(&file.content_hash)
        .bind(file.created_at)
        .bind(file.updated_at)
        .execute(&mut *tx)
        .await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO log_entries (id, log_file_id, timestamp_ms, level, message,
                                         error_code, service, host, metadata_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.id)
            .bind(&file.id)
            .bind(entry.timestamp.timestamp_millis())
            .bind(entry.level.as_str())
            .bind(&entry.message)
            .bind(&entry.error_code)
            .bind(&entry.service)
            .bind(&entry.host)
            .bind(serde_json::to_string(&entry.metadata)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_log_file(&self, id: &str) -> Result<Option<LogFile>> {
        let row = sqlx::query(&format!("SELECT {FILE_COLUMNS} FROM log_files WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| file_from_row(&r)).transpose()
    }

    async fn list_log_files(&self) -> Result<Vec<LogFile>> {
        let rows = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM log_files ORDER BY created_at ASC, rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(file_from_row).collect()
    }

    async fn get_log_entries(&self, log_file_id: &str) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, log_file_id, timestamp_ms, level, message, error_code, service, host,
                   metadata_json
            FROM log_entries
            WHERE log_file_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(log_file_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn set_rca_status(
        &self,
        log_file_id: &str,
        status: RcaStatus,
        job_id: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE log_files
            SET rca_status = ?, active_job_id = COALESCE(?, active_job_id), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(job_id)
        .bind(now_ts())
        .bind(log_file_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("log file not found: {}", log_file_id);
        }
        Ok(())
    }

    async fn create_job_if_idle(&self, job: &Job) -> Result<bool> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO jobs ({JOB_COLUMNS})
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM jobs
                WHERE log_file_id = ? AND status IN ('pending', 'running')
            )
            "#
        ))
        .bind(&job.id)
        .bind(&job.job_type)
        .bind(&job.log_file_id)
        .bind(job.status.as_str())
        .bind(job.progress as i64)
        .bind(job.total_chunks as i64)
        .bind(job.current_chunk as i64)
        .bind(job.failed_chunk.map(|c| c as i64))
        .bind(serde_json::to_string(&job.failed_chunks)?)
        .bind(job.result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&job.error)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(&job.log_file_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected() == 1),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                status = ?, progress = ?, total_chunks = ?, current_chunk = ?,
                failed_chunk = ?, failed_chunks_json = ?, result_json = ?, error = ?,
                started_at = ?, completed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.progress as i64)
        .bind(job.total_chunks as i64)
        .bind(job.current_chunk as i64)
        .bind(job.failed_chunk.map(|c| c as i64))
        .bind(serde_json::to_string(&job.failed_chunks)?)
        .bind(job.result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&job.error)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .bind(&job.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("job not found: {}", job.id);
        }
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    async fn list_jobs(&self, log_file_id: &str) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE log_file_id = ? ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(log_file_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn fail_active_jobs(&self, reason: &str, now: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'failed', error = ?, completed_at = ?, updated_at = ?
            WHERE status IN ('pending', 'running')
            "#,
        )
        .bind(reason)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE log_files SET rca_status = 'failed', updated_at = ?
            WHERE rca_status IN ('pending', 'running')
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn merge_pattern(&self, candidate: &PatternCandidate, now: i64) -> Result<MergeOutcome> {
        for attempt in 1..=MAX_MERGE_ATTEMPTS {
            match self.pattern_row_by_name(&candidate.name).await? {
                None => {
                    let pattern = new_pattern(candidate, now);
                    let mut tx = self.pool.begin().await?;
                    let inserted = sqlx::query(&format!(
                        r#"
                        INSERT INTO patterns ({PATTERN_COLUMNS})
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
                        ON CONFLICT(name) DO NOTHING
                        "#
                    ))
                    .bind(&pattern.id)
                    .bind(&pattern.name)
                    .bind(&pattern.description)
                    .bind(serde_json::to_string(&pattern.keywords)?)
                    .bind(&pattern.root_cause)
                    .bind(serde_json::to_string(&pattern.common_fixes)?)
                    .bind(pattern.severity.as_str())
                    .bind(pattern.occurrence_count as i64)
                    .bind(pattern.last_seen)
                    .bind(pattern.confidence)
                    .bind(serde_json::to_string(&pattern.metadata)?)
                    .bind(pattern.created_at)
                    .bind(pattern.updated_at)
                    .execute(&mut *tx)
                    .await?;

                    if inserted.rows_affected() == 0 {
                        // Another writer inserted the name first; merge into it.
                        tx.rollback().await?;
                        debug!(pattern = %candidate.name, attempt, "pattern insert lost race");
                        continue;
                    }

                    insert_example(&mut tx, &pattern.id, &candidate.example).await?;
                    tx.commit().await?;
                    return Ok(MergeOutcome {
                        pattern,
                        created: true,
                    });
                }
                Some((mut pattern, version)) => {
                    merge_into(&mut pattern, candidate, now);
                    let mut tx = self.pool.begin().await?;
                    let updated = sqlx::query(
                        r#"
                        UPDATE patterns SET
                            occurrence_count = ?, last_seen = ?, confidence = ?,
                            common_fixes_json = ?, updated_at = ?, version = version + 1
                        WHERE id = ? AND version = ?
                        "#,
                    )
                    .bind(pattern.occurrence_count as i64)
                    .bind(pattern.last_seen)
                    .bind(pattern.confidence)
                    .bind(serde_json::to_string(&pattern.common_fixes)?)
                    .bind(pattern.updated_at)
                    .bind(&pattern.id)
                    .bind(version)
                    .execute(&mut *tx)
                    .await?;

                    if updated.rows_affected() == 0 {
                        tx.rollback().await?;
                        debug!(pattern = %candidate.name, attempt, "pattern merge conflict, retrying");
                        continue;
                    }

                    insert_example(&mut tx, &pattern.id, &candidate.example).await?;
                    tx.commit().await?;
                    return Ok(MergeOutcome {
                        pattern,
                        created: false,
                    });
                }
            }
        }

        bail!(
            "pattern merge for '{}' did not settle after {} attempts",
            candidate.name,
            MAX_MERGE_ATTEMPTS
        )
    }

    async fn list_patterns(&self) -> Result<Vec<Pattern>> {
        let rows = sqlx::query(&format!(
            "SELECT {PATTERN_COLUMNS} FROM patterns ORDER BY created_at ASC, rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| pattern_from_row(r).map(|(p, _)| p))
            .collect()
    }

    async fn get_pattern(&self, id: &str) -> Result<Option<Pattern>> {
        let row = sqlx::query(&format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| pattern_from_row(&r).map(|(p, _)| p)).transpose()
    }

    async fn get_pattern_by_name(&self, name: &str) -> Result<Option<Pattern>> {
        Ok(self.pattern_row_by_name(name).await?.map(|(p, _)| p))
    }

    async fn pattern_examples(&self, pattern_id: &str) -> Result<Vec<PatternExample>> {
        let rows = sqlx::query(
            r#"
            SELECT id, pattern_id, log_file_id, summary, root_cause, error_count, severity,
                   timestamp
            FROM pattern_examples
            WHERE pattern_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(pattern_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(example_from_row).collect()
    }

    async fn delete_pattern(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM pattern_examples WHERE pattern_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM patterns WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn adjust_pattern_confidence(
        &self,
        name: &str,
        delta: f64,
        now: i64,
    ) -> Result<Option<Pattern>> {
        let result = sqlx::query(
            r#"
            UPDATE patterns SET
                confidence = MIN(1.0, MAX(0.0, confidence + ?)),
                updated_at = ?,
                version = version + 1
            WHERE name = ?
            "#,
        )
        .bind(delta)
        .bind(now)
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_pattern_by_name(name).await
    }

    async fn insert_memory(&self, memory: &Memory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO memories (id, log_file_id, summary, root_cause, embedding, dims,
                                  metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&memory.id)
        .bind(&memory.log_file_id)
        .bind(&memory.summary)
        .bind(&memory.root_cause)
        .bind(memory.embedding.to_blob())
        .bind(memory.embedding.dims() as i64)
        .bind(serde_json::to_string(&memory.metadata)?)
        .bind(memory.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let row = sqlx::query(&format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| memory_from_row(&r)).transpose()
    }

    async fn count_memories(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn nearest_memories(
        &self,
        query: &Embedding,
        limit: usize,
        exclude_log_file: Option<&str>,
    ) -> Result<Vec<ScoredMemory>> {
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // `IS NOT` keeps memories without a log file when one is excluded.
        let rows = sqlx::query(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories \
             WHERE dims = ? AND (? IS NULL OR log_file_id IS NOT ?) \
             ORDER BY seq ASC"
        ))
        .bind(query.dims() as i64)
        .bind(exclude_log_file)
        .bind(exclude_log_file)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let memory = memory_from_row(row)?;
            scored.push(ScoredMemory {
                score: query.cosine(&memory.embedding),
                memory,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO feedback ({FEEDBACK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&feedback.id)
        .bind(&feedback.memory_id)
        .bind(&feedback.user_id)
        .bind(feedback.is_correct)
        .bind(&feedback.correction)
        .bind(feedback.feedback_type.as_str())
        .bind(&feedback.pattern_name)
        .bind(&feedback.root_cause_section)
        .bind(feedback.confidence_impact)
        .bind(feedback.processed)
        .bind(feedback.processed_at)
        .bind(feedback.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_feedback(&self, memory_id: Option<&str>) -> Result<Vec<Feedback>> {
        let rows = match memory_id {
            Some(id) => {
                sqlx::query(&format!(
                    "SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE memory_id = ? ORDER BY seq ASC"
                ))
                .bind(id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {FEEDBACK_COLUMNS} FROM feedback ORDER BY seq ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(feedback_from_row).collect()
    }

    async fn mark_feedback_processed(&self, id: &str, now: i64) -> Result<()> {
        let result = sqlx::query("UPDATE feedback SET processed = 1, processed_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            bail!("feedback not found: {}", id);
        }
        Ok(())
    }
}
