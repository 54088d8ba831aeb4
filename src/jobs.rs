//! Chunked RCA job engine.
//!
//! Runs one job per accepted request as a background tokio task:
//!
//! ```text
//! StartJob ──▶ conditional insert (pending) ──▶ spawn ─┐
//!                                                      ▼
//!   running ─▶ health check ─▶ learning insights ─▶ chunk 1..N ─▶ completed | failed
//!                                                                     │
//!                                                     learn_from_analysis (best-effort)
//! ```
//!
//! Chunks are analyzed strictly in order. A failed chunk is recorded in
//! `failed_chunk` / `failed_chunks` and the run moves on; only a run in
//! which every chunk fails ends `failed`. Every transition is persisted
//! before the next client call, so a status read always sees a consistent
//! snapshot with `current_chunk <= total_chunks` and a non-decreasing
//! `progress`.
//!
//! The terminal write is retried up to [`TERMINAL_PERSIST_ATTEMPTS`] times.
//! If it still fails the stored job stays active, and the error is returned
//! from [`JobHandle::wait`] so the caller can run `recover`.

use anyhow::{anyhow, Context};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use autolog_core::analysis::ChunkAggregate;
use autolog_core::chunk::{chunk_count, chunk_entries, DEFAULT_CHUNK_SIZE};
use autolog_core::client::{AnalysisClient, AnalysisRequest};
use autolog_core::error::{persistence, RcaError, RcaResult};
use autolog_core::learning::learn_from_analysis;
use autolog_core::models::{
    chunk_progress, now_ts, Job, JobReport, JobStatus, LogEntry, LogFile, RcaStatus,
};
use autolog_core::retrieval::{get_learning_insights, RetrievalParams};
use autolog_core::store::Store;

use crate::config::Config;
use crate::progress::{JobProgressEvent, JobProgressReporter, NoProgress};

/// Attempts at writing a job's `completed` or `failed` snapshot.
pub const TERMINAL_PERSIST_ATTEMPTS: u32 = 3;
const TERMINAL_PERSIST_BACKOFF: Duration = Duration::from_millis(50);

/// Engine tunables.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub chunk_size: usize,
    /// Check the client before dispatching the first chunk.
    pub health_check: bool,
    pub retrieval: RetrievalParams,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            health_check: true,
            retrieval: RetrievalParams::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.jobs.chunk_size,
            health_check: config.jobs.health_check,
            retrieval: config.retrieval.params(),
        }
    }
}

/// Handle to an accepted job.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: String,
    task: Option<JoinHandle<anyhow::Result<()>>>,
}

impl JobHandle {
    /// A handle for a job that finished synchronously.
    pub fn completed(job_id: String) -> Self {
        Self { job_id, task: None }
    }

    /// Whether a background run is still attached to this handle.
    pub fn is_background(&self) -> bool {
        self.task.is_some()
    }

    /// Wait for the background run, including its learning step, to finish.
    ///
    /// Fails when the task panicked or its terminal state could not be
    /// stored.
    pub async fn wait(self) -> anyhow::Result<String> {
        if let Some(task) = self.task {
            task.await
                .map_err(|e| anyhow!("job {} task failed: {}", self.job_id, e))?
                .with_context(|| format!("job {} did not reach a stored terminal state", self.job_id))?;
        }
        Ok(self.job_id)
    }
}

/// Executes RCA jobs against a store and an analysis client.
#[derive(Clone)]
pub struct JobEngine {
    store: Arc<dyn Store>,
    client: Arc<dyn AnalysisClient>,
    settings: EngineSettings,
    reporter: Arc<dyn JobProgressReporter>,
}

impl JobEngine {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn AnalysisClient>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            client,
            settings,
            reporter: Arc::new(NoProgress),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn JobProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Accept a job for `log_file` and run it in the background.
    ///
    /// # Errors
    ///
    /// `Validation` when `error_entries` is empty or another job is active
    /// for the same log file; `Persistence` when the job cannot be recorded.
    pub async fn start_job(
        &self,
        log_file: &LogFile,
        error_entries: Vec<LogEntry>,
    ) -> RcaResult<JobHandle> {
        if error_entries.is_empty() {
            return Err(RcaError::validation(format!(
                "log file {} has no error entries to analyze",
                log_file.id
            )));
        }

        let total_chunks = chunk_count(error_entries.len(), self.settings.chunk_size);
        let job = Job::new_pending(&log_file.id, total_chunks);

        let created = self
            .store
            .create_job_if_idle(&job)
            .await
            .map_err(persistence)?;
        if !created {
            return Err(RcaError::validation(format!(
                "an RCA job is already active for log file {}",
                log_file.id
            )));
        }

        if let Err(e) = self
            .store
            .set_rca_status(&log_file.id, RcaStatus::Pending, Some(&job.id))
            .await
        {
            warn!(log_file_id = %log_file.id, error = %e, "failed to mark log file pending");
        }

        info!(
            job_id = %job.id,
            log_file_id = %log_file.id,
            entries = error_entries.len(),
            total_chunks,
            "rca job accepted"
        );

        let job_id = job.id.clone();
        let engine = self.clone();
        let file = log_file.clone();
        let task = tokio::spawn(async move { engine.run(job, file, error_entries).await });

        Ok(JobHandle {
            job_id,
            task: Some(task),
        })
    }

    async fn persist(&self, job: &Job) {
        if let Err(e) = self.store.update_job(job).await {
            error!(job_id = %job.id, error = %e, "failed to persist job state");
        }
    }

    async fn persist_terminal(&self, job: &Job) -> anyhow::Result<()> {
        let mut attempt = 1;
        loop {
            match self.store.update_job(job).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < TERMINAL_PERSIST_ATTEMPTS => {
                    warn!(job_id = %job.id, attempt, error = %e, "terminal job write failed, retrying");
                    tokio::time::sleep(TERMINAL_PERSIST_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(job_id = %job.id, attempts = attempt, error = %e, "failed to persist terminal job state");
                    return Err(e.context(format!("failed to store {} state", job.status)));
                }
            }
        }
    }

    async fn mark_file(&self, log_file_id: &str, status: RcaStatus) {
        if let Err(e) = self.store.set_rca_status(log_file_id, status, None).await {
            warn!(log_file_id, error = %e, "failed to update log file rca status");
        }
    }

    async fn fail(&self, mut job: Job, log_file: &LogFile, message: String) -> anyhow::Result<()> {
        let now = now_ts();
        job.status = JobStatus::Failed;
        job.error = Some(message);
        job.completed_at = Some(now);
        job.updated_at = now;
        let stored = self.persist_terminal(&job).await;
        self.mark_file(&log_file.id, RcaStatus::Failed).await;

        error!(job_id = %job.id, error = job.error.as_deref().unwrap_or_default(), "rca job failed");
        self.reporter.report(JobProgressEvent::Finished {
            job_id: job.id.clone(),
            status: JobStatus::Failed.to_string(),
        });
        stored
    }

    async fn run(&self, mut job: Job, log_file: LogFile, entries: Vec<LogEntry>) -> anyhow::Result<()> {
        let now = now_ts();
        job.status = JobStatus::Running;
        job.started_at = Some(now);
        job.updated_at = now;
        self.persist(&job).await;
        self.mark_file(&log_file.id, RcaStatus::Running).await;
        self.reporter.report(JobProgressEvent::Started {
            job_id: job.id.clone(),
            total_chunks: job.total_chunks,
        });

        if self.settings.health_check {
            if let Err(e) = self.client.health_check().await {
                return self
                    .fail(job, &log_file, format!("LLM service unavailable: {}", e))
                    .await;
            }
        }

        let insights = get_learning_insights(
            self.store.as_ref(),
            self.client.as_ref(),
            &log_file,
            &entries,
            &self.settings.retrieval,
        )
        .await;
        let context = Some(insights.suggested_context.as_str()).filter(|c| !c.is_empty());

        let mut aggregate = ChunkAggregate::new();
        let mut chunk_errors: Vec<String> = Vec::new();

        for chunk in chunk_entries(&entries, self.settings.chunk_size) {
            let request = AnalysisRequest {
                log_file: &log_file,
                entries: chunk.entries,
                learning_context: context,
                chunk: chunk.number,
                total_chunks: job.total_chunks,
            };

            let ok = match self.client.analyze(request).await {
                Ok(result) => {
                    aggregate.push(result);
                    true
                }
                Err(e) => {
                    warn!(
                        job_id = %job.id,
                        chunk = chunk.number,
                        total_chunks = job.total_chunks,
                        error = %e,
                        "chunk analysis failed"
                    );
                    job.failed_chunk = Some(chunk.number);
                    job.failed_chunks.push(chunk.number);
                    chunk_errors.push(format!("chunk {}: {}", chunk.number, e));
                    false
                }
            };

            job.current_chunk = chunk.number.min(job.total_chunks);
            job.progress = job
                .progress
                .max(chunk_progress(job.current_chunk, job.total_chunks));
            job.updated_at = now_ts();
            self.persist(&job).await;
            self.reporter.report(JobProgressEvent::Chunk {
                job_id: job.id.clone(),
                chunk: chunk.number,
                total: job.total_chunks,
                ok,
            });
        }

        let Some((analysis, partials)) = aggregate.finish() else {
            let message = format!(
                "all {} chunks failed: {}",
                job.total_chunks,
                chunk_errors.join("; ")
            );
            return self.fail(job, &log_file, message).await;
        };

        let now = now_ts();
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.completed_at = Some(now);
        job.updated_at = now;
        job.result = Some(JobReport {
            analysis: analysis.clone(),
            partials,
            failed_chunks: job.failed_chunks.clone(),
            similar_incidents: insights.similar_incidents.len(),
            pattern_matches: insights.pattern_matches.len(),
            confidence_boost: insights.confidence_boost,
        });
        if let Err(e) = self.persist_terminal(&job).await {
            self.mark_file(&log_file.id, RcaStatus::Failed).await;
            return Err(e);
        }
        self.mark_file(&log_file.id, RcaStatus::Completed).await;

        info!(
            job_id = %job.id,
            failed_chunks = job.failed_chunks.len(),
            severity = analysis.severity.as_str(),
            "rca job completed"
        );
        self.reporter.report(JobProgressEvent::Finished {
            job_id: job.id.clone(),
            status: JobStatus::Completed.to_string(),
        });

        learn_from_analysis(
            self.store.as_ref(),
            self.client.as_ref(),
            &log_file,
            &analysis,
        )
        .await;
        Ok(())
    }
}
