//! Job engine and service tests over the in-memory store.
//!
//! A scripted analysis client stands in for the language-model service:
//! chunks listed in `failing` return an upstream error, every other chunk
//! returns the same "database timeout" finding, and every text embeds to
//! the same vector so stored analyses always recall each other.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use autolog::jobs::{EngineSettings, TERMINAL_PERSIST_ATTEMPTS};
use autolog::service::{RcaService, INTERRUPTED};
use autolog_core::analysis::{AnalysisResult, ErrorFinding, FindingSeverity, Severity, NO_INCIDENT};
use autolog_core::client::{AnalysisClient, AnalysisRequest};
use autolog_core::embedding::Embedding;
use autolog_core::error::{RcaError, RcaResult};
use autolog_core::feedback::FeedbackDraft;
use autolog_core::models::{
    Feedback, FeedbackType, Job, JobStatus, Level, LogEntry, LogFile, Memory, MergeOutcome,
    Pattern, PatternCandidate, PatternExample, ProcessingStatus, RcaStatus, ScoredMemory,
};
use autolog_core::store::memory::InMemoryStore;
use autolog_core::store::Store;

const VECTOR: [f32; 3] = [0.6, 0.0, 0.8];
const PATTERN: &str = "Database connection timeout";

// ─── Scripted client ────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Snapshot {
    chunk: usize,
    status: JobStatus,
    current_chunk: usize,
    total_chunks: usize,
    progress: u8,
}

#[derive(Default)]
struct ScriptedClient {
    failing: HashSet<usize>,
    unhealthy: bool,
    gate: Option<Arc<Notify>>,
    observer: Option<Arc<InMemoryStore>>,
    calls: Mutex<Vec<usize>>,
    contexts: Mutex<Vec<Option<String>>>,
    snapshots: Mutex<Vec<Snapshot>>,
}

impl ScriptedClient {
    fn failing(chunks: &[usize]) -> Self {
        Self {
            failing: chunks.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }

    fn contexts(&self) -> Vec<Option<String>> {
        self.contexts.lock().unwrap().clone()
    }

    fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().unwrap().clone()
    }
}

fn chunk_result(chunk: usize, entries: usize) -> AnalysisResult {
    AnalysisResult {
        summary: format!("chunk {} summary", chunk),
        severity: Severity::High,
        incident_type: Some("Database Outage".to_string()),
        root_cause: "Connection pool exhausted".to_string(),
        recommendations: vec!["Raise the pool size".to_string()],
        error_analysis: vec![ErrorFinding {
            error_pattern: PATTERN.to_string(),
            error_count: entries as u32,
            first_occurrence: "2026-10-01T10:00:00Z".to_string(),
            last_occurrence: "2026-10-01T10:05:00Z".to_string(),
            severity: FindingSeverity::Critical,
            root_cause: "Connection pool exhausted".to_string(),
            impact: "Orders cannot be written".to_string(),
            fix: "Raise the pool size".to_string(),
            related_errors: Vec::new(),
        }],
        critical_errors: entries as u32,
        non_critical_errors: 0,
    }
}

#[async_trait]
impl AnalysisClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze(&self, request: AnalysisRequest<'_>) -> RcaResult<AnalysisResult> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if let Some(store) = &self.observer {
            let jobs = store.list_jobs(&request.log_file.id).await.unwrap();
            let job = jobs
                .into_iter()
                .rev()
                .find(|j| j.status.is_active())
                .expect("an active job while a chunk is analyzed");
            self.snapshots.lock().unwrap().push(Snapshot {
                chunk: request.chunk,
                status: job.status,
                current_chunk: job.current_chunk,
                total_chunks: job.total_chunks,
                progress: job.progress,
            });
        }

        self.calls.lock().unwrap().push(request.chunk);
        self.contexts
            .lock()
            .unwrap()
            .push(request.learning_context.map(str::to_string));

        if self.failing.contains(&request.chunk) {
            return Err(RcaError::upstream(format!(
                "model returned garbage for chunk {}",
                request.chunk
            )));
        }
        Ok(chunk_result(request.chunk, request.entries.len()))
    }

    async fn embed(&self, _text: &str) -> RcaResult<Embedding> {
        Ok(Embedding::new(VECTOR.to_vec()))
    }

    async fn health_check(&self) -> RcaResult<()> {
        if self.unhealthy {
            Err(RcaError::upstream("connection refused"))
        } else {
            Ok(())
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn settings(chunk_size: usize) -> EngineSettings {
    EngineSettings {
        chunk_size,
        ..EngineSettings::default()
    }
}

fn service(store: &Arc<InMemoryStore>, client: &Arc<ScriptedClient>, chunk_size: usize) -> RcaService {
    let store: Arc<dyn Store> = store.clone();
    let client: Arc<dyn AnalysisClient> = client.clone();
    RcaService::new(store, client, settings(chunk_size))
}

async fn seed_file(store: &InMemoryStore, name: &str, errors: usize, infos: usize) -> LogFile {
    let mut file = LogFile::new(name, 4096);
    let mut entries = Vec::new();
    for i in 0..infos {
        entries.push(LogEntry::new(&file.id, Level::Info, format!("request {} served", i)));
    }
    for i in 0..errors {
        let mut entry = LogEntry::new(
            &file.id,
            Level::Error,
            format!("Database connection timeout on orders-db (attempt {})", i),
        );
        entry.service = Some("orders".to_string());
        entries.push(entry);
    }
    file.tally(&entries);
    file.processing_status = ProcessingStatus::Completed;
    store.insert_log_file(&file, &entries).await.unwrap();
    file
}

async fn analyze(service: &RcaService, file: &LogFile) -> String {
    let handle = service.request_analysis(&file.id).await.unwrap();
    handle.wait().await.unwrap()
}

// ─── Chunked runs ───────────────────────────────────────────────────

#[tokio::test]
async fn test_partial_failure_completes_with_failed_chunk() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient::failing(&[2]));
    let service = service(&store, &client, 2);
    let file = seed_file(&store, "api.jsonl", 6, 1).await;

    let job_id = analyze(&service, &file).await;
    let status = service.get_status(&job_id).await.unwrap();

    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.total_chunks, 3);
    assert_eq!(status.current_chunk, 3);
    assert_eq!(status.progress, 100);
    assert_eq!(status.failed_chunk, Some(2));
    assert_eq!(status.failed_chunks, vec![2]);
    assert!(status.error.is_none());

    let report = status.result.expect("completed job carries a report");
    assert_eq!(report.partials.len(), 2);
    assert_eq!(report.failed_chunks, vec![2]);
    assert_eq!(report.analysis.critical_errors, 4);
    assert_eq!(report.analysis.summary, "chunk 3 summary");

    assert_eq!(client.calls(), vec![1, 2, 3]);

    let file = service.get_log_file(&file.id).await.unwrap();
    assert_eq!(file.rca_status, RcaStatus::Completed);
    assert_eq!(file.active_job_id.as_deref(), Some(job_id.as_str()));
}

#[tokio::test]
async fn test_every_chunk_failing_fails_the_job() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient::failing(&[1, 2]));
    let service = service(&store, &client, 25);
    let file = seed_file(&store, "api.jsonl", 30, 0).await;

    let job_id = analyze(&service, &file).await;
    let status = service.get_status(&job_id).await.unwrap();

    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.total_chunks, 2);
    assert_eq!(status.current_chunk, 2);
    assert_eq!(status.failed_chunk, Some(2));
    assert_eq!(status.failed_chunks, vec![1, 2]);
    assert!(status.result.is_none());
    let error = status.error.unwrap();
    assert!(error.starts_with("all 2 chunks failed: chunk 1:"), "{}", error);
    assert!(error.contains("chunk 2:"), "{}", error);

    assert_eq!(
        service.get_log_file(&file.id).await.unwrap().rca_status,
        RcaStatus::Failed
    );
    assert!(service.get_patterns().await.unwrap().is_empty());
    assert_eq!(store.count_memories().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unhealthy_client_fails_before_any_chunk() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient {
        unhealthy: true,
        ..ScriptedClient::default()
    });
    let service = service(&store, &client, 25);
    let file = seed_file(&store, "api.jsonl", 3, 0).await;

    let job_id = analyze(&service, &file).await;
    let status = service.get_status(&job_id).await.unwrap();

    assert_eq!(status.status, JobStatus::Failed);
    let error = status.error.unwrap();
    assert!(error.starts_with("LLM service unavailable:"), "{}", error);
    assert!(error.contains("connection refused"), "{}", error);
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_health_check_can_be_skipped() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient {
        unhealthy: true,
        ..ScriptedClient::default()
    });
    let store_dyn: Arc<dyn Store> = store.clone();
    let client_dyn: Arc<dyn AnalysisClient> = client.clone();
    let service = RcaService::new(
        store_dyn,
        client_dyn,
        EngineSettings {
            health_check: false,
            ..EngineSettings::default()
        },
    );
    let file = seed_file(&store, "api.jsonl", 3, 0).await;

    let job_id = analyze(&service, &file).await;
    assert_eq!(
        service.get_status(&job_id).await.unwrap().status,
        JobStatus::Completed
    );
    assert_eq!(client.calls(), vec![1]);
}

#[tokio::test]
async fn test_progress_snapshots_are_consistent() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient {
        observer: Some(store.clone()),
        failing: [3].into_iter().collect(),
        ..ScriptedClient::default()
    });
    let service = service(&store, &client, 2);
    let file = seed_file(&store, "api.jsonl", 8, 0).await;

    let job_id = analyze(&service, &file).await;

    let snapshots = client.snapshots();
    assert_eq!(snapshots.len(), 4);
    let mut last_progress = 0;
    for snap in &snapshots {
        assert_eq!(snap.status, JobStatus::Running);
        assert_eq!(snap.total_chunks, 4);
        assert_eq!(snap.current_chunk, snap.chunk - 1);
        assert!(snap.current_chunk <= snap.total_chunks);
        assert!(snap.progress >= last_progress);
        last_progress = snap.progress;
    }
    let progress: Vec<u8> = snapshots.iter().map(|s| s.progress).collect();
    assert_eq!(progress, vec![0, 25, 50, 75]);

    let status = service.get_status(&job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.progress, 100);
    assert_eq!(status.failed_chunk, Some(3));
}

// ─── Admission ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_job_rejected_while_one_is_active() {
    let store = Arc::new(InMemoryStore::new());
    let gate = Arc::new(Notify::new());
    let client = Arc::new(ScriptedClient {
        gate: Some(gate.clone()),
        ..ScriptedClient::default()
    });
    let service = service(&store, &client, 25);
    let file = seed_file(&store, "api.jsonl", 3, 0).await;

    let first = service.request_analysis(&file.id).await.unwrap();
    assert!(first.is_background());

    let err = service.request_analysis(&file.id).await.unwrap_err();
    assert!(err.is_validation(), "{}", err);
    assert!(err.to_string().contains("already active"), "{}", err);

    gate.notify_one();
    let first_id = first.wait().await.unwrap();
    assert_eq!(
        service.get_status(&first_id).await.unwrap().status,
        JobStatus::Completed
    );

    // Terminal jobs no longer block a new run.
    gate.notify_one();
    let second_id = analyze(&service, &file).await;
    assert_ne!(first_id, second_id);
    assert_eq!(service.list_jobs(&file.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_start_job_rejects_empty_error_set() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient::default());
    let service = service(&store, &client, 25);
    let file = seed_file(&store, "quiet.jsonl", 0, 2).await;

    let err = service.start_job(&file, Vec::new()).await.unwrap_err();
    assert!(err.is_validation());
    assert!(store.list_jobs(&file.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_without_errors_gets_no_incident_job() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient::default());
    let service = service(&store, &client, 25);
    let file = seed_file(&store, "quiet.jsonl", 0, 5).await;

    let handle = service.request_analysis(&file.id).await.unwrap();
    assert!(!handle.is_background());
    let job_id = handle.wait().await.unwrap();

    let status = service.get_status(&job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.total_chunks, 0);
    assert_eq!(status.progress, 100);
    let report = status.result.unwrap();
    assert_eq!(report.analysis.incident_type.as_deref(), Some(NO_INCIDENT));
    assert!(report.analysis.summary.contains("quiet.jsonl"));
    assert!(report.partials.is_empty());

    assert!(client.calls().is_empty());
    let file = service.get_log_file(&file.id).await.unwrap();
    assert_eq!(file.rca_status, RcaStatus::Completed);
    assert_eq!(file.active_job_id.as_deref(), Some(job_id.as_str()));
    assert_eq!(store.count_memories().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_records_are_not_found() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient::default());
    let service = service(&store, &client, 25);

    assert!(service.get_status("nope").await.unwrap_err().is_not_found());
    assert!(service.request_analysis("nope").await.unwrap_err().is_not_found());
    assert!(service.list_jobs("nope").await.unwrap_err().is_not_found());
    assert!(service.get_pattern_by_id("nope").await.unwrap_err().is_not_found());
    assert!(service.delete_pattern("nope").await.unwrap_err().is_not_found());
    assert!(service.list_feedback("nope").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_recover_fails_interrupted_jobs() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient::default());
    let service = service(&store, &client, 25);
    let file = seed_file(&store, "api.jsonl", 3, 0).await;

    let orphan = Job::new_pending(&file.id, 1);
    assert!(store.create_job_if_idle(&orphan).await.unwrap());
    store
        .set_rca_status(&file.id, RcaStatus::Pending, Some(&orphan.id))
        .await
        .unwrap();

    assert_eq!(service.recover().await.unwrap(), 1);
    let status = service.get_status(&orphan.id).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.error.as_deref(), Some(INTERRUPTED));
    assert!(status.completed_at.is_some());
    assert_eq!(
        service.get_log_file(&file.id).await.unwrap().rca_status,
        RcaStatus::Failed
    );

    assert_eq!(service.recover().await.unwrap(), 0);

    let job_id = analyze(&service, &file).await;
    assert_eq!(
        service.get_status(&job_id).await.unwrap().status,
        JobStatus::Completed
    );
}

// ─── Learning ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_completed_job_learns_pattern_and_memory() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient::default());
    let service = service(&store, &client, 25);
    let file = seed_file(&store, "api.jsonl", 3, 0).await;

    analyze(&service, &file).await;

    let patterns = service.get_patterns().await.unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].name, PATTERN);
    assert_eq!(patterns[0].occurrence_count, 1);
    assert!((patterns[0].confidence - 0.8).abs() < 1e-9);
    assert_eq!(patterns[0].root_cause, "Connection pool exhausted");
    assert_eq!(patterns[0].common_fixes, vec!["Raise the pool size".to_string()]);

    let detail = service.get_pattern_by_id(&patterns[0].id).await.unwrap();
    assert_eq!(detail.examples.len(), 1);
    assert_eq!(detail.examples[0].snapshot.log_file_id, file.id);

    assert_eq!(store.count_memories().await.unwrap(), 1);
    let metrics = service.get_learning_metrics().await.unwrap();
    assert_eq!(metrics.total_analyses, 1);
    assert_eq!(metrics.total_patterns, 1);
}

#[tokio::test]
async fn test_second_incident_recalls_first() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient::default());
    let service = service(&store, &client, 25);
    let first = seed_file(&store, "monday.jsonl", 3, 0).await;
    let second = seed_file(&store, "tuesday.jsonl", 4, 0).await;

    analyze(&service, &first).await;
    assert_eq!(client.contexts(), vec![None]);

    let insights = service.get_learning_insights(&second.id).await.unwrap();
    assert_eq!(insights.similar_incidents.len(), 1);
    assert_eq!(insights.similar_incidents[0].filename, "monday.jsonl");
    assert_eq!(insights.pattern_matches.len(), 1);
    assert!((insights.confidence_boost - 0.35).abs() < 1e-9);

    // A file never recalls its own analysis.
    let own = service.get_learning_insights(&first.id).await.unwrap();
    assert!(own.similar_incidents.is_empty());

    let job_id = analyze(&service, &second).await;
    let contexts = client.contexts();
    let context = contexts[1].as_deref().expect("learning context for the second run");
    assert!(context.contains("SIMILAR PAST INCIDENTS"), "{}", context);
    assert!(context.contains("monday.jsonl"), "{}", context);
    assert!(context.contains("IDENTIFIED PATTERNS"), "{}", context);

    let report = service.get_status(&job_id).await.unwrap().result.unwrap();
    assert_eq!(report.similar_incidents, 1);
    assert_eq!(report.pattern_matches, 1);

    let pattern = store.get_pattern_by_name(PATTERN).await.unwrap().unwrap();
    assert_eq!(pattern.occurrence_count, 2);
    assert!((pattern.confidence - 0.9).abs() < 1e-9);
    assert_eq!(store.count_memories().await.unwrap(), 2);
}

#[tokio::test]
async fn test_pattern_delete_removes_it() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient::default());
    let service = service(&store, &client, 25);
    let file = seed_file(&store, "api.jsonl", 2, 0).await;
    analyze(&service, &file).await;

    let id = service.get_patterns().await.unwrap()[0].id.clone();
    service.delete_pattern(&id).await.unwrap();

    assert!(service.get_patterns().await.unwrap().is_empty());
    assert!(service.get_pattern_by_id(&id).await.unwrap_err().is_not_found());
    assert!(service.delete_pattern(&id).await.unwrap_err().is_not_found());
}

// ─── Feedback ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_feedback_adjusts_pattern_confidence() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient::default());
    let service = service(&store, &client, 25);
    let file = seed_file(&store, "api.jsonl", 3, 0).await;
    analyze(&service, &file).await;

    let memory_id = store
        .nearest_memories(&Embedding::new(VECTOR.to_vec()), 1, None)
        .await
        .unwrap()[0]
        .memory
        .id
        .clone();

    let mut draft = FeedbackDraft::new(&memory_id, false);
    draft.feedback_type = FeedbackType::Pattern;
    draft.pattern_name = Some(PATTERN.to_string());
    draft.correction = Some("The replica was down".to_string());
    draft.confidence_impact = -0.3;
    service.submit_feedback(draft).await.unwrap();

    let summary = service.feedback_summary(&memory_id).await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.negative, 1);
    assert_eq!(summary.corrections, vec!["The replica was down".to_string()]);

    let outcome = service.process_pending_feedback().await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.adjusted, 1);
    assert_eq!(outcome.missing_patterns, 0);

    let pattern = store.get_pattern_by_name(PATTERN).await.unwrap().unwrap();
    assert!((pattern.confidence - 0.5).abs() < 1e-9);

    let records = service.list_feedback(&memory_id).await.unwrap();
    assert!(records.iter().all(|f| f.processed));

    // Already processed: a second pass changes nothing.
    let again = service.process_pending_feedback().await.unwrap();
    assert_eq!(again.processed, 0);

    let insights = service.feedback_insights().await.unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].pattern_name, PATTERN);
    assert_eq!(insights[0].negative, 1);
}

#[tokio::test]
async fn test_pattern_feedback_requires_pattern_name() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedClient::default());
    let service = service(&store, &client, 25);

    let mut draft = FeedbackDraft::new("m1", true);
    draft.feedback_type = FeedbackType::Pattern;
    assert!(service.submit_feedback(draft).await.unwrap_err().is_validation());
}

// ─── Terminal write failures ────────────────────────────────────────

/// Delegates to an in-memory store but rejects the first
/// `terminal_failures` writes of a `completed` or `failed` job.
struct FlakyStore {
    inner: Arc<InMemoryStore>,
    terminal_failures: AtomicU32,
}

impl FlakyStore {
    fn new(inner: &Arc<InMemoryStore>, terminal_failures: u32) -> Self {
        Self {
            inner: inner.clone(),
            terminal_failures: AtomicU32::new(terminal_failures),
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_log_file(&self, file: &LogFile, entries: &[LogEntry]) -> anyhow::Result<()> {
        self.inner.insert_log_file(file, entries).await
    }
    async fn get_log_file(&self, id: &str) -> anyhow::Result<Option<LogFile>> {
        self.inner.get_log_file(id).await
    }
    async fn list_log_files(&self) -> anyhow::Result<Vec<LogFile>> {
        self.inner.list_log_files().await
    }
    async fn get_log_entries(&self, log_file_id: &str) -> anyhow::Result<Vec<LogEntry>> {
        self.inner.get_log_entries(log_file_id).await
    }
    async fn set_rca_status(
        &self,
        log_file_id: &str,
        status: RcaStatus,
        job_id: Option<&str>,
    ) -> anyhow::Result<()> {
        self.inner.set_rca_status(log_file_id, status, job_id).await
    }
    async fn create_job_if_idle(&self, job: &Job) -> anyhow::Result<bool> {
        self.inner.create_job_if_idle(job).await
    }
    async fn update_job(&self, job: &Job) -> anyhow::Result<()> {
        if !job.status.is_active()
            && self
                .terminal_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            anyhow::bail!("database is locked");
        }
        self.inner.update_job(job).await
    }
    async fn get_job(&self, id: &str) -> anyhow::Result<Option<Job>> {
        self.inner.get_job(id).await
    }
    async fn list_jobs(&self, log_file_id: &str) -> anyhow::Result<Vec<Job>> {
        self.inner.list_jobs(log_file_id).await
    }
    async fn fail_active_jobs(&self, reason: &str, now: i64) -> anyhow::Result<u64> {
        self.inner.fail_active_jobs(reason, now).await
    }
    async fn merge_pattern(
        &self,
        candidate: &PatternCandidate,
        now: i64,
    ) -> anyhow::Result<MergeOutcome> {
        self.inner.merge_pattern(candidate, now).await
    }
    async fn list_patterns(&self) -> anyhow::Result<Vec<Pattern>> {
        self.inner.list_patterns().await
    }
    async fn get_pattern(&self, id: &str) -> anyhow::Result<Option<Pattern>> {
        self.inner.get_pattern(id).await
    }
    async fn get_pattern_by_name(&self, name: &str) -> anyhow::Result<Option<Pattern>> {
        self.inner.get_pattern_by_name(name).await
    }
    async fn pattern_examples(&self, pattern_id: &str) -> anyhow::Result<Vec<PatternExample>> {
        self.inner.pattern_examples(pattern_id).await
    }
    async fn delete_pattern(&self, id: &str) -> anyhow::Result<bool> {
        self.inner.delete_pattern(id).await
    }
    async fn adjust_pattern_confidence(
        &self,
        name: &str,
        delta: f64,
        now: i64,
    ) -> anyhow::Result<Option<Pattern>> {
        self.inner.adjust_pattern_confidence(name, delta, now).await
    }
    async fn insert_memory(&self, memory: &Memory) -> anyhow::Result<()> {
        self.inner.insert_memory(memory).await
    }
    async fn get_memory(&self, id: &str) -> anyhow::Result<Option<Memory>> {
        self.inner.get_memory(id).await
    }
    async fn count_memories(&self) -> anyhow::Result<u64> {
        self.inner.count_memories().await
    }
    async fn nearest_memories(
        &self,
        query: &Embedding,
        limit: usize,
        exclude_log_file: Option<&str>,
    ) -> anyhow::Result<Vec<ScoredMemory>> {
        self.inner.nearest_memories(query, limit, exclude_log_file).await
    }
    async fn insert_feedback(&self, feedback: &Feedback) -> anyhow::Result<()> {
        self.inner.insert_feedback(feedback).await
    }
    async fn list_feedback(&self, memory_id: Option<&str>) -> anyhow::Result<Vec<Feedback>> {
        self.inner.list_feedback(memory_id).await
    }
    async fn mark_feedback_processed(&self, id: &str, now: i64) -> anyhow::Result<()> {
        self.inner.mark_feedback_processed(id, now).await
    }
}

fn flaky_service(store: &Arc<InMemoryStore>, terminal_failures: u32) -> RcaService {
    let store: Arc<dyn Store> = Arc::new(FlakyStore::new(store, terminal_failures));
    let client: Arc<dyn AnalysisClient> = Arc::new(ScriptedClient::default());
    RcaService::new(store, client, settings(25))
}

#[tokio::test]
async fn test_terminal_write_is_retried() {
    let store = Arc::new(InMemoryStore::new());
    let service = flaky_service(&store, TERMINAL_PERSIST_ATTEMPTS - 1);
    let file = seed_file(&store, "api.jsonl", 3, 0).await;

    let job_id = analyze(&service, &file).await;

    let job = store.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(
        store.get_log_file(&file.id).await.unwrap().unwrap().rca_status,
        RcaStatus::Completed
    );
}

#[tokio::test]
async fn test_unstored_terminal_state_surfaces_on_wait() {
    let store = Arc::new(InMemoryStore::new());
    let service = flaky_service(&store, TERMINAL_PERSIST_ATTEMPTS);
    let file = seed_file(&store, "api.jsonl", 3, 0).await;

    let handle = service.request_analysis(&file.id).await.unwrap();
    let job_id = handle.job_id.clone();
    let err = handle.wait().await.unwrap_err();
    assert!(
        format!("{:#}", err).contains("database is locked"),
        "{:#}",
        err
    );

    // Still active in the store, so recovery can release the file.
    let job = store.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(store.count_memories().await.unwrap(), 0);
    assert_eq!(service.recover().await.unwrap(), 1);
    assert_eq!(
        store.get_job(&job_id).await.unwrap().unwrap().status,
        JobStatus::Failed
    );
}
