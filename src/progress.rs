//! RCA job progress reporting.
//!
//! Reports observable progress while `autolog analyze` runs a job, so users
//! see which chunk is being analyzed, how many remain, and how the job
//! ended. Progress is emitted on **stderr** so stdout remains parseable for
//! scripts.

use std::io::Write;
use std::sync::Arc;

use autolog_core::models::chunk_progress;

/// A single progress event for one job.
#[derive(Clone, Debug)]
pub enum JobProgressEvent {
    /// The job is running; chunk dispatch is about to start.
    Started { job_id: String, total_chunks: usize },
    /// Chunk `chunk` of `total` was attempted.
    Chunk {
        job_id: String,
        chunk: usize,
        total: usize,
        ok: bool,
    },
    /// The job reached a terminal state.
    Finished { job_id: String, status: String },
}

/// Reports job progress. Implementations write to stderr (human or JSON).
pub trait JobProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the job engine.
    fn report(&self, event: JobProgressEvent);
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn human_line(event: &JobProgressEvent) -> String {
    match event {
        JobProgressEvent::Started {
            job_id,
            total_chunks,
        } => format!(
            "job {}  analyzing {} chunk{}",
            short_id(job_id),
            total_chunks,
            if *total_chunks == 1 { "" } else { "s" }
        ),
        JobProgressEvent::Chunk {
            job_id,
            chunk,
            total,
            ok,
        } => format!(
            "job {}  chunk {}/{} ({:>3}%)  {}",
            short_id(job_id),
            chunk,
            total,
            chunk_progress(*chunk, *total),
            if *ok { "ok" } else { "FAILED" }
        ),
        JobProgressEvent::Finished { job_id, status } => {
            format!("job {}  {}", short_id(job_id), status)
        }
    }
}

/// Human-friendly progress on stderr: `job 1a2b3c4d  chunk 3/12 ( 25%)  ok`.
pub struct StderrProgress;

impl JobProgressReporter for StderrProgress {
    fn report(&self, event: JobProgressEvent) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", human_line(&event));
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JobProgressReporter for JsonProgress {
    fn report(&self, event: JobProgressEvent) {
        let obj = match &event {
            JobProgressEvent::Started {
                job_id,
                total_chunks,
            } => serde_json::json!({
                "event": "started",
                "job_id": job_id,
                "total_chunks": total_chunks
            }),
            JobProgressEvent::Chunk {
                job_id,
                chunk,
                total,
                ok,
            } => serde_json::json!({
                "event": "chunk",
                "job_id": job_id,
                "chunk": chunk,
                "total": total,
                "percent": chunk_progress(*chunk, *total),
                "ok": ok
            }),
            JobProgressEvent::Finished { job_id, status } => serde_json::json!({
                "event": "finished",
                "job_id": job_id,
                "status": status
            }),
        };
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", obj);
        let _ = err.flush();
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl JobProgressReporter for NoProgress {
    fn report(&self, _event: JobProgressEvent) {}
}

/// Value of `autolog analyze --progress`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress on a terminal, nothing when stderr is redirected.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn JobProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
