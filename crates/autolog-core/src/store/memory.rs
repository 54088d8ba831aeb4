//! In-memory [`Store`] implementation for tests and embedded use.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. The conditional
//! job insert and the pattern merge each run under a single write lock,
//! which makes them atomic with respect to every other caller.
//! Memory search is a brute-force cosine scan.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::Embedding;
use crate::learning::{merge_into, new_pattern};
use crate::models::{
    new_id, Feedback, Job, JobStatus, LogEntry, LogFile, Memory, MergeOutcome, Pattern,
    PatternCandidate, PatternExample, RcaStatus, ScoredMemory,
};

use super::Store;

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

/// In-memory store. Insertion order is kept for every listing.
pub struct InMemoryStore {
    files: RwLock<Vec<LogFile>>,
    entries: RwLock<HashMap<String, Vec<LogEntry>>>,
    jobs: RwLock<Vec<Job>>,
    patterns: RwLock<Vec<Pattern>>,
    examples: RwLock<Vec<PatternExample>>,
    memories: RwLock<Vec<Memory>>,
    feedback: RwLock<Vec<Feedback>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(Vec::new()),
            entries: RwLock::new(HashMap::new()),
            jobs: RwLock::new(Vec::new()),
            patterns: RwLock::new(Vec::new()),
            examples: RwLock::new(Vec::new()),
            memories: RwLock::new(Vec::new()),
            feedback: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_log_file(&self, file: &LogFile, entries: &[LogEntry]) -> Result<()> {
        let mut files = write(&self.files)?;
        if files.iter().any(|f| f.id == file.id) {
            anyhow::bail!("log file already exists: {}", file.id);
        }
        files.push(file.clone());
        write(&self.entries)?.insert(file.id.clone(), entries.to_vec());
        Ok(())
    }

    async fn get_log_file(&self, id: &str) -> Result<Option<LogFile>> {
        Ok(read(&self.files)?.iter().find(|f| f.id == id).cloned())
    }

    async fn list_log_files(&self) -> Result<Vec<LogFile>> {
        Ok(read(&self.files)?.clone())
    }

    async fn get_log_entries(&self, log_file_id: &str) -> Result<Vec<LogEntry>> {
        Ok(read(&self.entries)?
            .get(log_file_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_rca_status(
        &self,
        log_file_id: &str,
        status: RcaStatus,
        job_id: Option<&str>,
    ) -> Result<()> {
        let mut files = write(&self.files)?;
        let file = files
            .iter_mut()
            .find(|f| f.id == log_file_id)
            .ok_or_else(|| anyhow!("log file not found: {}", log_file_id))?;
        file.rca_status = status;
        if let Some(job_id) = job_id {
            file.active_job_id = Some(job_id.to_string());
        }
        file.updated_at = crate::models::now_ts();
        Ok(())
    }

    async fn create_job_if_idle(&self, job: &Job) -> Result<bool> {
        let mut jobs = write(&self.jobs)?;
        let busy = jobs
            .iter()
            .any(|j| j.log_file_id == job.log_file_id && j.status.is_active());
        if busy {
            return Ok(false);
        }
        jobs.push(job.clone());
        Ok(true)
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let mut jobs = write(&self.jobs)?;
        let slot = jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| anyhow!("job not found: {}", job.id))?;
        *slot = job.clone();
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        Ok(read(&self.jobs)?.iter().find(|j| j.id == id).cloned())
    }

    async fn list_jobs(&self, log_file_id: &str) -> Result<Vec<Job>> {
        Ok(read(&self.jobs)?
            .iter()
            .filter(|j| j.log_file_id == log_file_id)
            .cloned()
            .collect())
    }

    async fn fail_active_jobs(&self, reason: &str, now: i64) -> Result<u64> {
        let mut jobs = write(&self.jobs)?;
        let mut count = 0;
        for job in jobs.iter_mut().filter(|j| j.status.is_active()) {
            job.status = JobStatus::Failed;
            job.error = Some(reason.to_string());
            job.completed_at = Some(now);
            job.updated_at = now;
            count += 1;
        }
        drop(jobs);

        for file in write(&self.files)?
            .iter_mut()
            .filter(|f| matches!(f.rca_status, RcaStatus::Pending | RcaStatus::Running))
        {
            file.rca_status = RcaStatus::Failed;
            file.updated_at = now;
        }
        Ok(count)
    }

    async fn merge_pattern(&self, candidate: &PatternCandidate, now: i64) -> Result<MergeOutcome> {
        let mut patterns = write(&self.patterns)?;
        let (pattern, created) = match patterns.iter_mut().find(|p| p.name == candidate.name) {
            Some(existing) => {
                merge_into(existing, candidate, now);
                (existing.clone(), false)
            }
            None => {
                let pattern = new_pattern(candidate, now);
                patterns.push(pattern.clone());
                (pattern, true)
            }
        };

        write(&self.examples)?.push(PatternExample {
            id: new_id(),
            pattern_id: pattern.id.clone(),
            snapshot: candidate.example.clone(),
        });

        Ok(MergeOutcome { pattern, created })
    }

    async fn list_patterns(&self) -> Result<Vec<Pattern>> {
        Ok(read(&self.patterns)?.clone())
    }

    async fn get_pattern(&self, id: &str) -> Result<Option<Pattern>> {
        Ok(read(&self.patterns)?.iter().find(|p| p.id == id).cloned())
    }

    async fn get_pattern_by_name(&self, name: &str) -> Result<Option<Pattern>> {
        Ok(read(&self.patterns)?
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn pattern_examples(&self, pattern_id: &str) -> Result<Vec<PatternExample>> {
        Ok(read(&self.examples)?
            .iter()
            .filter(|e| e.pattern_id == pattern_id)
            .cloned()
            .collect())
    }

    async fn delete_pattern(&self, id: &str) -> Result<bool> {
        let mut patterns = write(&self.patterns)?;
        let before = patterns.len();
        patterns.retain(|p| p.id != id);
        if patterns.len() == before {
            return Ok(false);
        }
        write(&self.examples)?.retain(|e| e.pattern_id != id);
        Ok(true)
    }

    async fn adjust_pattern_confidence(
        &self,
        name: &str,
        delta: f64,
        now: i64,
    ) -> Result<Option<Pattern>> {
        let mut patterns = write(&self.patterns)?;
        Ok(patterns.iter_mut().find(|p| p.name == name).map(|p| {
            p.confidence = (p.confidence + delta).clamp(0.0, 1.0);
            p.updated_at = now;
            p.clone()
        }))
    }

    async fn insert_memory(&self, memory: &Memory) -> Result<()> {
        write(&self.memories)?.push(memory.clone());
        Ok(())
    }

    async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        Ok(read(&self.memories)?.iter().find(|m| m.id == id).cloned())
    }

    async fn count_memories(&self) -> Result<u64> {
        Ok(read(&self.memories)?.len() as u64)
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

        let memories = read(&self.memories)?;
        let mut scored: Vec<ScoredMemory> = memories
            .iter()
            .filter(|m| m.embedding.dims() == query.dims())
            .filter(|m| exclude_log_file.is_none() || m.log_file_id.as_deref() != exclude_log_file)
            .map(|m| ScoredMemory {
                score: query.cosine(&m.embedding),
                memory: m.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<()> {
        write(&self.feedback)?.push(feedback.clone());
        Ok(())
    }

    async fn list_feedback(&self, memory_id: Option<&str>) -> Result<Vec<Feedback>> {
        Ok(read(&self.feedback)?
            .iter()
            .filter(|f| memory_id.map_or(true, |id| f.memory_id == id))
            .cloned()
            .collect())
    }

    async fn mark_feedback_processed(&self, id: &str, now: i64) -> Result<()> {
        let mut feedback = write(&self.feedback)?;
        let record = feedback
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| anyhow!("feedback not found: {}", id))?;
        record.processed = true;
        record.processed_at = Some(now);
        Ok(())
    }
}
