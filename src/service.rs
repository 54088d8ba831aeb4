//! Upward facade over the job engine and the learning layer.
//!
//! Every operation is a single call returning data or a typed
//! [`RcaError`]. Store failures surface as `Persistence`, unknown records
//! as `NotFound`. The CLI is built on this type; an HTTP layer would be too.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use autolog_core::analysis::no_incident_analysis;
use autolog_core::chunk::error_entries;
use autolog_core::client::AnalysisClient;
use autolog_core::error::{persistence, RcaError, RcaResult};
use autolog_core::feedback::{
    self, summarize, FeedbackDraft, FeedbackInsight, FeedbackSummary, ProcessOutcome,
};
use autolog_core::learning::{self, LearningMetrics};
use autolog_core::models::{
    now_ts, Feedback, Job, JobReport, JobStatus, LogEntry, LogFile, Pattern, PatternDetail,
    RcaStatus,
};
use autolog_core::retrieval::{self, LearningInsights};
use autolog_core::store::Store;

use crate::config::Config;
use crate::jobs::{EngineSettings, JobEngine, JobHandle};
use crate::progress::JobProgressReporter;

/// Error text recorded on jobs failed by [`RcaService::recover`].
pub const INTERRUPTED: &str = "job interrupted: the process running it exited";

/// Snapshot returned by [`RcaService::get_status`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub id: String,
    pub log_file_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub current_chunk: usize,
    pub total_chunks: usize,
    pub failed_chunk: Option<usize>,
    pub failed_chunks: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl From<Job> for JobStatusView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            log_file_id: job.log_file_id,
            status: job.status,
            progress: job.progress,
            current_chunk: job.current_chunk,
            total_chunks: job.total_chunks,
            failed_chunk: job.failed_chunk,
            failed_chunks: job.failed_chunks,
            result: job.result,
            error: job.error,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// Client reachability as reported by `autolog health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub client: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct RcaService {
    store: Arc<dyn Store>,
    client: Arc<dyn AnalysisClient>,
    engine: JobEngine,
}

impl RcaService {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn AnalysisClient>,
        settings: EngineSettings,
    ) -> Self {
        let engine = JobEngine::new(store.clone(), client.clone(), settings);
        Self {
            store,
            client,
            engine,
        }
    }

    /// Build a service from configuration over an already-connected store.
    pub fn from_config(config: &Config, store: Arc<dyn Store>) -> anyhow::Result<Self> {
        let client = crate::ollama::create_client(config)?;
        Ok(Self::new(store, client, EngineSettings::from_config(config)))
    }

    /// Route job progress events to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn JobProgressReporter>) -> Self {
        self.engine = self.engine.with_reporter(reporter);
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // ---- log files ----

    pub async fn get_log_file(&self, id: &str) -> RcaResult<LogFile> {
        self.store
            .get_log_file(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| RcaError::not_found("log file", id))
    }

    pub async fn list_log_files(&self) -> RcaResult<Vec<LogFile>> {
        self.store.list_log_files().await.map_err(persistence)
    }

    // ---- jobs ----

    /// Start RCA for a stored log file.
    ///
    /// A file without `ERROR`/`FATAL` entries gets a job recorded directly
    /// as `completed` with the no-incident result; the client is never
    /// called and the returned handle has nothing to wait for.
    pub async fn request_analysis(&self, log_file_id: &str) -> RcaResult<JobHandle> {
        let log_file = self.get_log_file(log_file_id).await?;
        let entries = self
            .store
            .get_log_entries(log_file_id)
            .await
            .map_err(persistence)?;
        let errors = error_entries(&entries);

        if !errors.is_empty() {
            return self.engine.start_job(&log_file, errors).await;
        }

        let report = JobReport::trivial(no_incident_analysis(&log_file.filename));
        let job = Job::new_completed(&log_file.id, report);
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
        self.store
            .set_rca_status(&log_file.id, RcaStatus::Completed, Some(&job.id))
            .await
            .map_err(persistence)?;

        info!(job_id = %job.id, log_file_id = %log_file.id, "no error entries; recorded no-incident analysis");
        Ok(JobHandle::completed(job.id))
    }

    /// Start a job over explicit error entries. See [`JobEngine::start_job`].
    pub async fn start_job(
        &self,
        log_file: &LogFile,
        error_entries: Vec<LogEntry>,
    ) -> RcaResult<JobHandle> {
        self.engine.start_job(log_file, error_entries).await
    }

    pub async fn get_status(&self, job_id: &str) -> RcaResult<JobStatusView> {
        self.store
            .get_job(job_id)
            .await
            .map_err(persistence)?
            .map(JobStatusView::from)
            .ok_or_else(|| RcaError::not_found("job", job_id))
    }

    /// Jobs of one log file, oldest first.
    pub async fn list_jobs(&self, log_file_id: &str) -> RcaResult<Vec<JobStatusView>> {
        self.get_log_file(log_file_id).await?;
        let jobs = self
            .store
            .list_jobs(log_file_id)
            .await
            .map_err(persistence)?;
        Ok(jobs.into_iter().map(JobStatusView::from).collect())
    }

    /// Fail every job left `pending` or `running` by a process that is gone.
    pub async fn recover(&self) -> RcaResult<u64> {
        let n = self
            .store
            .fail_active_jobs(INTERRUPTED, now_ts())
            .await
            .map_err(persistence)?;
        if n > 0 {
            info!(jobs = n, "marked interrupted jobs failed");
        }
        Ok(n)
    }

    // ---- learning ----

    pub async fn get_learning_insights(&self, log_file_id: &str) -> RcaResult<LearningInsights> {
        let log_file = self.get_log_file(log_file_id).await?;
        let entries = self
            .store
            .get_log_entries(log_file_id)
            .await
            .map_err(persistence)?;
        let errors = error_entries(&entries);
        Ok(retrieval::get_learning_insights(
            self.store.as_ref(),
            self.client.as_ref(),
            &log_file,
            &errors,
            &self.engine.settings().retrieval,
        )
        .await)
    }

    /// All patterns, highest confidence first.
    pub async fn get_patterns(&self) -> RcaResult<Vec<Pattern>> {
        let mut patterns = self.store.list_patterns().await.map_err(persistence)?;
        patterns.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.occurrence_count.cmp(&a.occurrence_count))
        });
        Ok(patterns)
    }

    pub async fn get_pattern_by_id(&self, id: &str) -> RcaResult<PatternDetail> {
        let pattern = self
            .store
            .get_pattern(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| RcaError::not_found("pattern", id))?;
        let examples = self
            .store
            .pattern_examples(id)
            .await
            .map_err(persistence)?;
        Ok(PatternDetail { pattern, examples })
    }

    pub async fn delete_pattern(&self, id: &str) -> RcaResult<()> {
        if self.store.delete_pattern(id).await.map_err(persistence)? {
            info!(pattern_id = id, "pattern deleted");
            Ok(())
        } else {
            Err(RcaError::not_found("pattern", id))
        }
    }

    pub async fn get_learning_metrics(&self) -> RcaResult<LearningMetrics> {
        learning::learning_metrics(self.store.as_ref()).await
    }

    // ---- feedback ----

    pub async fn submit_feedback(&self, draft: FeedbackDraft) -> RcaResult<Feedback> {
        feedback::submit_feedback(self.store.as_ref(), draft).await
    }

    pub async fn list_feedback(&self, memory_id: &str) -> RcaResult<Vec<Feedback>> {
        self.store
            .get_memory(memory_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| RcaError::not_found("memory", memory_id))?;
        self.store
            .list_feedback(Some(memory_id))
            .await
            .map_err(persistence)
    }

    pub async fn feedback_summary(&self, memory_id: &str) -> RcaResult<FeedbackSummary> {
        let records = self.list_feedback(memory_id).await?;
        Ok(summarize(&records))
    }

    /// Insights over all feedback, grouped by pattern and root cause section.
    pub async fn feedback_insights(&self) -> RcaResult<Vec<FeedbackInsight>> {
        let records = self.store.list_feedback(None).await.map_err(persistence)?;
        Ok(feedback::feedback_insights(&records))
    }

    pub async fn process_pending_feedback(&self) -> RcaResult<ProcessOutcome> {
        feedback::process_pending_feedback(self.store.as_ref()).await
    }

    // ---- client ----

    pub async fn health(&self) -> HealthReport {
        match self.client.health_check().await {
            Ok(()) => HealthReport {
                client: self.client.name().to_string(),
                ok: true,
                error: None,
            },
            Err(e) => HealthReport {
                client: self.client.name().to_string(),
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Connect to the configured database and build a service over it.
///
/// The schema must already exist (`autolog init`).
pub async fn open(config: &Config) -> anyhow::Result<RcaService> {
    let pool = crate::db::connect(config).await?;
    let store: Arc<dyn Store> = Arc::new(crate::sqlite_store::SqliteStore::new(pool));
    RcaService::from_config(config, store)
}
