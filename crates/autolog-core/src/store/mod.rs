//! Storage abstraction for autolog.
//!
//! The [`Store`] trait defines every persistence operation the job engine,
//! the learning layer, and the facade need, enabling pluggable backends
//! (SQLite in the app crate, [`memory::InMemoryStore`] here).
//!
//! Two operations carry concurrency guarantees that callers rely on:
//!
//! - [`Store::create_job_if_idle`] inserts a job only when no `pending` or
//!   `running` job exists for the same log file, as one atomic step.
//! - [`Store::merge_pattern`] performs the read-check-write pattern merge
//!   atomically per pattern name, so concurrent job completions never lose
//!   an occurrence or a confidence step.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::Embedding;
use crate::models::{
    Feedback, Job, LogEntry, LogFile, Memory, MergeOutcome, Pattern, PatternCandidate,
    PatternExample, RcaStatus, ScoredMemory,
};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_log_file`](Store::insert_log_file) | Store a parsed log file and its entries |
/// | [`get_log_file`](Store::get_log_file) / [`get_log_entries`](Store::get_log_entries) | Read a log file and its entries in order |
/// | [`set_rca_status`](Store::set_rca_status) | Track the RCA lifecycle on the log file |
/// | [`create_job_if_idle`](Store::create_job_if_idle) | Conditional job insert (one active job per file) |
/// | [`update_job`](Store::update_job) / [`get_job`](Store::get_job) | Persist and read job snapshots |
/// | [`fail_active_jobs`](Store::fail_active_jobs) | Terminate jobs orphaned by a crashed run |
/// | [`merge_pattern`](Store::merge_pattern) | Atomic insert-or-merge of a pattern plus its example |
/// | [`adjust_pattern_confidence`](Store::adjust_pattern_confidence) | Atomic signed confidence update |
/// | [`insert_memory`](Store::insert_memory) / [`nearest_memories`](Store::nearest_memories) | Memory append and brute-force similarity scan |
/// | [`insert_feedback`](Store::insert_feedback) / [`mark_feedback_processed`](Store::mark_feedback_processed) | Feedback records |
#[async_trait]
pub trait Store: Send + Sync {
    // ---- log files ----

    /// Insert a log file together with its parsed entries (entry order is kept).
    async fn insert_log_file(&self, file: &LogFile, entries: &[LogEntry]) -> Result<()>;

    async fn get_log_file(&self, id: &str) -> Result<Option<LogFile>>;

    async fn list_log_files(&self) -> Result<Vec<LogFile>>;

    /// All entries of a log file in their original order.
    async fn get_log_entries(&self, log_file_id: &str) -> Result<Vec<LogEntry>>;

    /// Update the RCA status. `job_id`, when given, replaces the active job reference.
    async fn set_rca_status(
        &self,
        log_file_id: &str,
        status: RcaStatus,
        job_id: Option<&str>,
    ) -> Result<()>;

    // ---- jobs ----

    /// Insert `job` unless an active job exists for its log file.
    ///
    /// Returns `false` (and writes nothing) when another job is active.
    async fn create_job_if_idle(&self, job: &Job) -> Result<bool>;

    /// Overwrite the stored snapshot of `job`.
    async fn update_job(&self, job: &Job) -> Result<()>;

    async fn get_job(&self, id: &str) -> Result<Option<Job>>;

    async fn list_jobs(&self, log_file_id: &str) -> Result<Vec<Job>>;

    /// Mark every `pending`/`running` job failed with `reason`. Returns the count.
    async fn fail_active_jobs(&self, reason: &str, now: i64) -> Result<u64>;

    // ---- patterns ----

    /// Insert the candidate as a new pattern or merge it into the pattern
    /// with the same name, and append its example, atomically.
    async fn merge_pattern(&self, candidate: &PatternCandidate, now: i64) -> Result<MergeOutcome>;

    async fn list_patterns(&self) -> Result<Vec<Pattern>>;

    async fn get_pattern(&self, id: &str) -> Result<Option<Pattern>>;

    async fn get_pattern_by_name(&self, name: &str) -> Result<Option<Pattern>>;

    async fn pattern_examples(&self, pattern_id: &str) -> Result<Vec<PatternExample>>;

    /// Delete a pattern and its examples. Returns `false` if it did not exist.
    async fn delete_pattern(&self, id: &str) -> Result<bool>;

    /// Add `delta` to the named pattern's confidence, clamped to `[0, 1]`.
    async fn adjust_pattern_confidence(
        &self,
        name: &str,
        delta: f64,
        now: i64,
    ) -> Result<Option<Pattern>>;

    // ---- memories ----

    async fn insert_memory(&self, memory: &Memory) -> Result<()>;

    async fn get_memory(&self, id: &str) -> Result<Option<Memory>>;

    async fn count_memories(&self) -> Result<u64>;

    /// Top `limit` memories by cosine similarity to `query`. Memories whose
    /// embedding dimensionality differs from the query are skipped, as are
    /// memories of `exclude_log_file` when one is given.
    async fn nearest_memories(
        &self,
        query: &Embedding,
        limit: usize,
        exclude_log_file: Option<&str>,
    ) -> Result<Vec<ScoredMemory>>;

    // ---- feedback ----

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<()>;

    /// Feedback for one memory, or all feedback when `memory_id` is `None`.
    async fn list_feedback(&self, memory_id: Option<&str>) -> Result<Vec<Feedback>>;

    async fn mark_feedback_processed(&self, id: &str, now: i64) -> Result<()>;
}
