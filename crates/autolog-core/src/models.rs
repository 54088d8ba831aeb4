//! Core data models for autolog.
//!
//! These types represent the log files, entries, RCA jobs, learned
//! patterns, analysis memories, and feedback records that flow through
//! the job pipeline and the learning layer. Status enums carry a stable
//! string form (`as_str` / `FromStr`) used at the persistence boundary.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{AnalysisResult, FindingSeverity, Severity};
use crate::embedding::Embedding;

/// Job type tag for root-cause-analysis jobs.
pub const RCA_JOB_TYPE: &str = "rca_analysis";

/// Generate a fresh record identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time as Unix seconds.
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> anyhow::Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => anyhow::bail!("unknown {} value: '{}'", stringify!($name), other),
                }
            }
        }
    };
}

// ============ Log files and entries ============

/// Parsing state of an uploaded log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

string_enum!(ProcessingStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

/// RCA state of a log file, driven by the job lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RcaStatus {
    NotStarted,
    Pending,
    Running,
    Completed,
    Failed,
}

string_enum!(RcaStatus {
    NotStarted => "not_started",
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFile {
    pub id: String,
    pub filename: String,
    pub size: i64,
    pub uploaded_by: Option<String>,
    pub processing_status: ProcessingStatus,
    pub entry_count: i64,
    pub error_count: i64,
    pub warning_count: i64,
    pub rca_status: RcaStatus,
    pub active_job_id: Option<String>,
    pub parse_error: Option<String>,
    /// SHA-256 of the raw upload.
    pub content_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl LogFile {
    /// A freshly uploaded file with no entries parsed yet.
    pub fn new(filename: impl Into<String>, size: i64) -> Self {
        let now = now_ts();
        Self {
            id: new_id(),
            filename: filename.into(),
            size,
            uploaded_by: None,
            processing_status: ProcessingStatus::Pending,
            entry_count: 0,
            error_count: 0,
            warning_count: 0,
            rca_status: RcaStatus::NotStarted,
            active_job_id: None,
            parse_error: None,
            content_hash: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Recompute entry, error, and warning counts from parsed entries.
    pub fn tally(&mut self, entries: &[LogEntry]) {
        self.entry_count = entries.len() as i64;
        self.error_count = entries.iter().filter(|e| e.level.is_error()).count() as i64;
        self.warning_count = entries.iter().filter(|e| e.level == Level::Warn).count() as i64;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }

    /// `ERROR` and `FATAL` entries are the only ones sent to analysis.
    pub fn is_error(&self) -> bool {
        matches!(self, Level::Error | Level::Fatal)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    /// Case-insensitive; accepts the common long forms.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Ok(Level::Debug),
            "INFO" | "NOTICE" => Ok(Level::Info),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "ERROR" | "ERR" => Ok(Level::Error),
            "FATAL" | "CRITICAL" | "PANIC" => Ok(Level::Fatal),
            other => anyhow::bail!("unknown log level: '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub log_file_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub error_code: Option<String>,
    pub service: Option<String>,
    pub host: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl LogEntry {
    pub fn new(log_file_id: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            log_file_id: log_file_id.into(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            error_code: None,
            service: None,
            host: None,
            metadata: serde_json::Value::Null,
        }
    }
}

// ============ Jobs ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

string_enum!(JobStatus {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

impl JobStatus {
    /// Pending and running jobs block new jobs on the same log file.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Result payload stored on a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    /// Aggregate over every chunk that produced a usable result.
    #[serde(rename = "final")]
    pub analysis: AnalysisResult,
    /// Per-chunk results in chunk order (failed chunks are absent).
    pub partials: Vec<AnalysisResult>,
    pub failed_chunks: Vec<usize>,
    pub similar_incidents: usize,
    pub pattern_matches: usize,
    pub confidence_boost: f64,
}

impl JobReport {
    /// Report for the degenerate no-errors case; no chunks, no history.
    pub fn trivial(analysis: AnalysisResult) -> Self {
        Self {
            analysis,
            partials: Vec::new(),
            failed_chunks: Vec::new(),
            similar_incidents: 0,
            pattern_matches: 0,
            confidence_boost: 0.0,
        }
    }
}

/// One RCA job. Mutated only by the run that created it.
///
/// `current_chunk <= total_chunks` at every persisted snapshot, and
/// `progress` never decreases while the job is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: String,
    pub log_file_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub total_chunks: usize,
    pub current_chunk: usize,
    /// Last failing chunk (1-based).
    pub failed_chunk: Option<usize>,
    /// Every failing chunk (1-based), in order.
    pub failed_chunks: Vec<usize>,
    pub result: Option<JobReport>,
    pub error: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Job {
    pub fn new_pending(log_file_id: impl Into<String>, total_chunks: usize) -> Self {
        let now = now_ts();
        Self {
            id: new_id(),
            job_type: RCA_JOB_TYPE.to_string(),
            log_file_id: log_file_id.into(),
            status: JobStatus::Pending,
            progress: 0,
            total_chunks,
            current_chunk: 0,
            failed_chunk: None,
            failed_chunks: Vec::new(),
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A job created directly in `completed` with no chunks.
    pub fn new_completed(log_file_id: impl Into<String>, report: JobReport) -> Self {
        let mut job = Self::new_pending(log_file_id, 0);
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.result = Some(report);
        job.started_at = Some(job.created_at);
        job.completed_at = Some(job.created_at);
        job
    }
}

/// `floor(100 * current / total)`; zero chunks count as done.
pub fn chunk_progress(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let current = current.min(total);
    ((current * 100) / total) as u8
}

// ============ Patterns ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatternMetadata {
    pub first_seen: i64,
    pub source: String,
}

/// A learned, named error signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub root_cause: String,
    pub common_fixes: Vec<String>,
    pub severity: FindingSeverity,
    /// Always >= 1.
    pub occurrence_count: u32,
    pub last_seen: i64,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub metadata: PatternMetadata,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Snapshot of the analysis a pattern was observed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleSnapshot {
    pub log_file_id: String,
    pub summary: String,
    pub root_cause: String,
    pub error_count: u32,
    pub severity: FindingSeverity,
    pub timestamp: i64,
}

/// Append-only link from a pattern to one observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternExample {
    pub id: String,
    pub pattern_id: String,
    #[serde(flatten)]
    pub snapshot: ExampleSnapshot,
}

/// A pattern extracted from one analysis, not yet merged into the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternCandidate {
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub root_cause: String,
    pub common_fixes: Vec<String>,
    pub severity: FindingSeverity,
    pub confidence: f64,
    pub metadata: PatternMetadata,
    pub example: ExampleSnapshot,
}

/// Outcome of an atomic pattern merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub pattern: Pattern,
    /// `true` when the name was new and a pattern was inserted.
    pub created: bool,
}

/// A pattern together with its recorded examples.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternDetail {
    #[serde(flatten)]
    pub pattern: Pattern,
    pub examples: Vec<PatternExample>,
}

// ============ Memories ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetadata {
    pub severity: Severity,
    pub recommendations: Vec<String>,
    pub error_count: u32,
}

/// Embedded record of one completed analysis. Immutable once stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub log_file_id: Option<String>,
    pub summary: String,
    pub root_cause: String,
    #[serde(skip)]
    pub embedding: Embedding,
    pub metadata: MemoryMetadata,
    pub created_at: i64,
}

/// A memory returned from a nearest-neighbour scan with its raw score.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub score: f64,
}

// ============ Feedback ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    General,
    RootCause,
    Pattern,
    Severity,
}

string_enum!(FeedbackType {
    General => "general",
    RootCause => "root_cause",
    Pattern => "pattern",
    Severity => "severity",
});

/// A user's correctness judgment on a memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    pub memory_id: String,
    pub user_id: Option<String>,
    pub is_correct: bool,
    pub correction: Option<String>,
    pub feedback_type: FeedbackType,
    pub pattern_name: Option<String>,
    pub root_cause_section: Option<String>,
    /// Signed confidence delta applied to `pattern_name` when processed.
    pub confidence_impact: f64,
    pub processed: bool,
    pub processed_at: Option<i64>,
    pub created_at: i64,
}
