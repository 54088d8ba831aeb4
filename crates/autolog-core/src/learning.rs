//! Pattern extraction, pattern merging, and analysis memories.
//!
//! Turns a completed analysis into durable knowledge:
//!
//! 1. [`extract_patterns`]: one [`PatternCandidate`] per distinct finding,
//!    keywords from a fixed lexical expansion table, confidence 0.8.
//! 2. [`merge_pattern`]: hands each candidate to [`Store::merge_pattern`],
//!    which applies [`new_pattern`] or [`merge_into`] atomically.
//! 3. [`store_memory`]: embeds `"summary\nroot cause"` and appends a
//!    [`Memory`].
//!
//! [`learn_from_analysis`] runs all three best-effort: failures are logged
//! and counted, never propagated, because learning must not affect the
//! outcome of the job that produced the analysis.
//!
//! # Merge rules
//!
//! | Field | New name | Existing name |
//! |-------|----------|---------------|
//! | `occurrence_count` | 1 | `+ 1` |
//! | `confidence` | candidate (0.8) | `min(confidence + 0.1, 1.0)` |
//! | `common_fixes` | candidate fixes | existing fixes followed by candidate fixes |
//! | `last_seen` | now | now |
//! | example | appended | appended |

use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::AnalysisResult;
use crate::client::AnalysisClient;
use crate::embedding::Embedding;
use crate::error::{persistence, RcaResult};
use crate::models::{
    new_id, now_ts, ExampleSnapshot, Feedback, LogFile, Memory, MemoryMetadata, MergeOutcome,
    Pattern, PatternCandidate, PatternMetadata,
};
use crate::store::Store;

pub const INITIAL_CONFIDENCE: f64 = 0.8;
pub const CONFIDENCE_STEP: f64 = 0.1;
pub const PATTERN_SOURCE: &str = "rca_analysis";

/// Label fragment → keywords added when the fragment appears in the label.
const KEYWORD_EXPANSIONS: &[(&str, &[&str])] = &[
    ("timeout", &["timeout", "connection timeout", "request timeout"]),
    ("connection", &["connection", "connect", "network"]),
    ("database", &["database", "db", "sql"]),
    ("authentication", &["authentication", "auth", "login"]),
];

/// Keywords for a pattern label: the label itself followed by the
/// expansions of every fragment it contains. Case-insensitive duplicates
/// are dropped.
pub fn expand_keywords(label: &str) -> Vec<String> {
    let lower = label.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();
    let mut push = |k: &str| {
        if !keywords.iter().any(|existing| existing.eq_ignore_ascii_case(k)) {
            keywords.push(k.to_string());
        }
    };

    push(label);
    for (fragment, expansions) in KEYWORD_EXPANSIONS {
        if lower.contains(fragment) {
            for k in *expansions {
                push(k);
            }
        }
    }
    keywords
}

/// One candidate per distinct (case-insensitive) finding label.
/// Findings with an empty label are skipped.
pub fn extract_patterns(
    analysis: &AnalysisResult,
    log_file_id: &str,
    now: i64,
) -> Vec<PatternCandidate> {
    let mut seen: Vec<String> = Vec::new();
    let mut candidates = Vec::new();

    for finding in &analysis.error_analysis {
        let name = finding.error_pattern.trim();
        if name.is_empty() {
            continue;
        }
        let key = name.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);

        let common_fixes = if finding.fix.trim().is_empty() {
            Vec::new()
        } else {
            vec![finding.fix.clone()]
        };

        candidates.push(PatternCandidate {
            name: name.to_string(),
            description: format!("Pattern: {}", name),
            keywords: expand_keywords(name),
            root_cause: finding.root_cause.clone(),
            common_fixes,
            severity: finding.severity,
            confidence: INITIAL_CONFIDENCE,
            metadata: PatternMetadata {
                first_seen: now,
                source: PATTERN_SOURCE.to_string(),
            },
            example: ExampleSnapshot {
                log_file_id: log_file_id.to_string(),
                summary: analysis.summary.clone(),
                root_cause: finding.root_cause.clone(),
                error_count: finding.error_count,
                severity: finding.severity,
                timestamp: now,
            },
        });
    }

    candidates
}

/// Build a brand-new pattern from a candidate (occurrence count 1).
pub fn new_pattern(candidate: &PatternCandidate, now: i64) -> Pattern {
    Pattern {
        id: new_id(),
        name: candidate.name.clone(),
        description: candidate.description.clone(),
        keywords: candidate.keywords.clone(),
        root_cause: candidate.root_cause.clone(),
        common_fixes: candidate.common_fixes.clone(),
        severity: candidate.severity,
        occurrence_count: 1,
        last_seen: now,
        confidence: candidate.confidence.clamp(0.0, 1.0),
        metadata: candidate.metadata.clone(),
        created_at: now,
        updated_at: now,
    }
}

/// Apply one re-observation to an existing pattern.
///
/// Confidence is monotonic and saturates at 1.0. Fixes are appended
/// without deduplication.
pub fn merge_into(pattern: &mut Pattern, candidate: &PatternCandidate, now: i64) {
    pattern.occurrence_count = pattern.occurrence_count.saturating_add(1);
    pattern.last_seen = now;
    pattern.updated_at = now;
    pattern.confidence = (pattern.confidence + CONFIDENCE_STEP).min(1.0);
    pattern
        .common_fixes
        .extend(candidate.common_fixes.iter().cloned());
}

/// Merge one candidate through the store's atomic merge.
pub async fn merge_pattern<S>(store: &S, candidate: &PatternCandidate) -> RcaResult<MergeOutcome>
where
    S: Store + ?Sized,
{
    store
        .merge_pattern(candidate, now_ts())
        .await
        .map_err(persistence)
}

/// Text embedded for a memory: summary and root cause on separate lines.
pub fn memory_text(analysis: &AnalysisResult) -> String {
    format!("{}\n{}", analysis.summary, analysis.root_cause)
}

pub fn memory_from_analysis(
    log_file_id: Option<&str>,
    analysis: &AnalysisResult,
    embedding: Embedding,
) -> Memory {
    Memory {
        id: new_id(),
        log_file_id: log_file_id.map(str::to_string),
        summary: analysis.summary.clone(),
        root_cause: analysis.root_cause.clone(),
        embedding,
        metadata: MemoryMetadata {
            severity: analysis.severity,
            recommendations: analysis.recommendations.clone(),
            error_count: analysis.error_count(),
        },
        created_at: now_ts(),
    }
}

/// Embed an analysis and append it to the memory store.
///
/// # Errors
///
/// `Upstream` if embedding fails, `Persistence` if the insert fails.
pub async fn store_memory<S, C>(
    store: &S,
    client: &C,
    log_file_id: Option<&str>,
    analysis: &AnalysisResult,
) -> RcaResult<Memory>
where
    S: Store + ?Sized,
    C: AnalysisClient + ?Sized,
{
    let embedding = client.embed(&memory_text(analysis)).await?;
    let memory = memory_from_analysis(log_file_id, analysis, embedding);
    store.insert_memory(&memory).await.map_err(persistence)?;
    Ok(memory)
}

/// What one learning pass achieved.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningOutcome {
    pub patterns_created: usize,
    pub patterns_merged: usize,
    pub pattern_failures: usize,
    pub memory_id: Option<String>,
}

/// Extract and merge patterns, then store a memory. Best-effort.
pub async fn learn_from_analysis<S, C>(
    store: &S,
    client: &C,
    log_file: &LogFile,
    analysis: &AnalysisResult,
) -> LearningOutcome
where
    S: Store + ?Sized,
    C: AnalysisClient + ?Sized,
{
    let mut outcome = LearningOutcome::default();

    for candidate in extract_patterns(analysis, &log_file.id, now_ts()) {
        match merge_pattern(store, &candidate).await {
            Ok(merged) if merged.created => outcome.patterns_created += 1,
            Ok(_) => outcome.patterns_merged += 1,
            Err(e) => {
                warn!(pattern = %candidate.name, error = %e, "failed to merge pattern");
                outcome.pattern_failures += 1;
            }
        }
    }

    match store_memory(store, client, Some(&log_file.id), analysis).await {
        Ok(memory) => outcome.memory_id = Some(memory.id),
        Err(e) => warn!(log_file_id = %log_file.id, error = %e, "failed to store analysis memory"),
    }

    info!(
        log_file_id = %log_file.id,
        created = outcome.patterns_created,
        merged = outcome.patterns_merged,
        failures = outcome.pattern_failures,
        "learned from analysis"
    );
    outcome
}

/// Aggregate learning figures, computed from stored records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningMetrics {
    /// Stored analysis memories.
    pub total_analyses: u64,
    pub total_patterns: u64,
    /// Re-observations of known patterns: `sum(occurrence_count - 1)`.
    pub pattern_matches: u64,
    /// Positive feedback share minus 0.5; 0 without feedback.
    pub accuracy_improvement: f64,
    pub average_confidence: f64,
    /// Share of patterns observed more than once.
    pub learning_rate: f64,
}

pub fn compute_metrics(
    patterns: &[Pattern],
    total_analyses: u64,
    feedback: &[Feedback],
) -> LearningMetrics {
    let total_patterns = patterns.len() as u64;
    let pattern_matches = patterns
        .iter()
        .map(|p| p.occurrence_count.saturating_sub(1) as u64)
        .sum();

    let (average_confidence, learning_rate) = if patterns.is_empty() {
        (0.0, 0.0)
    } else {
        let n = patterns.len() as f64;
        let avg = patterns.iter().map(|p| p.confidence).sum::<f64>() / n;
        let repeated = patterns.iter().filter(|p| p.occurrence_count > 1).count() as f64;
        (avg, repeated / n)
    };

    let accuracy_improvement = if feedback.is_empty() {
        0.0
    } else {
        let positive = feedback.iter().filter(|f| f.is_correct).count() as f64;
        positive / feedback.len() as f64 - 0.5
    };

    LearningMetrics {
        total_analyses,
        total_patterns,
        pattern_matches,
        accuracy_improvement,
        average_confidence,
        learning_rate,
    }
}

/// Compute [`LearningMetrics`] from the store.
pub async fn learning_metrics<S>(store: &S) -> RcaResult<LearningMetrics>
where
    S: Store + ?Sized,
{
    let patterns = store.list_patterns().await.map_err(persistence)?;
    let total = store.count_memories().await.map_err(persistence)?;
    let feedback = store.list_feedback(None).await.map_err(persistence)?;
    Ok(compute_metrics(&patterns, total, &feedback))
}
