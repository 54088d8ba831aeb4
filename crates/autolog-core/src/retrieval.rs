//! Similarity and pattern retrieval for new analyses.
//!
//! Before a job dispatches its first chunk it asks this module what the
//! system already knows about errors like these:
//!
//! - **Similar incidents**: the error context is embedded and compared
//!   against stored memories by exact cosine similarity. Results below the
//!   similarity threshold (default 0.7) are dropped.
//! - **Pattern matches**: every stored pattern is scored lexically against
//!   the error context, +0.2 per keyword found and +0.3 when its root cause
//!   appears, capped at 1.0. Matches must exceed the pattern threshold
//!   (default 0.5).
//!
//! Both lists are labelled with a [`Relevance`] bucket, summarized into a
//! confidence boost in `[0, 0.5]`, and rendered into a suggested-context
//! block for the next analysis call.
//!
//! Every sub-step in [`get_learning_insights`] is isolated: a failure is
//! logged and yields an empty part, never an error.

use serde::Serialize;
use tracing::{debug, warn};

use crate::analysis::Severity;
use crate::client::AnalysisClient;
use crate::embedding::Embedding;
use crate::error::{persistence, RcaResult};
use crate::feedback::{concerns_pattern, feedback_context};
use crate::learning::{learning_metrics, LearningMetrics};
use crate::models::{Feedback, LogEntry, LogFile, Pattern};
use crate::store::Store;

const KEYWORD_WEIGHT: f64 = 0.2;
const ROOT_CAUSE_WEIGHT: f64 = 0.3;
const INCIDENT_BOOST_HIGH: f64 = 0.2;
const INCIDENT_BOOST_MEDIUM: f64 = 0.1;
const PATTERN_BOOST_HIGH: f64 = 0.15;
const PATTERN_BOOST_MEDIUM: f64 = 0.08;
pub const MAX_CONFIDENCE_BOOST: f64 = 0.5;
const CONTEXT_ITEMS: usize = 3;
const UNKNOWN_FILENAME: &str = "unknown";
const FALLBACK_MATCH_REASON: &str = "pattern similarity based on historical analysis";

/// Tunables for retrieval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    /// Minimum cosine similarity for a similar incident.
    pub similarity_threshold: f64,
    /// Memories fetched from the store before thresholding.
    pub top_k: usize,
    /// Pattern matches must score strictly above this.
    pub pattern_threshold: f64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            top_k: 5,
            pattern_threshold: 0.5,
        }
    }
}

/// Coarse bucket for a similarity or confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl Relevance {
    /// `>= 0.8` high, `>= 0.6` medium, otherwise low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Relevance::High
        } else if score >= 0.6 {
            Relevance::Medium
        } else {
            Relevance::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relevance::High => "high",
            Relevance::Medium => "medium",
            Relevance::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarIncident {
    pub memory_id: String,
    pub log_file_id: Option<String>,
    pub filename: String,
    pub summary: String,
    pub root_cause: String,
    pub severity: Severity,
    pub timestamp: i64,
    pub similarity: f64,
    pub relevance: Relevance,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    pub pattern: Pattern,
    /// Lexical match confidence, not the pattern's own confidence.
    pub confidence: f64,
    pub match_reason: String,
    pub relevance: Relevance,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningInsights {
    pub similar_incidents: Vec<SimilarIncident>,
    pub pattern_matches: Vec<PatternMatch>,
    pub confidence_boost: f64,
    pub suggested_context: String,
    pub learning_metrics: LearningMetrics,
}

/// Serialize entries one per line, in order:
/// `LEVEL: message[ | error_code=..][ | service=..]`.
pub fn build_error_context(entries: &[LogEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(entry.level.as_str());
        out.push_str(": ");
        out.push_str(&entry.message);
        if let Some(code) = entry.error_code.as_deref().filter(|c| !c.is_empty()) {
            out.push_str(" | error_code=");
            out.push_str(code);
        }
        if let Some(service) = entry.service.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(" | service=");
            out.push_str(service);
        }
        out.push('\n');
    }
    out
}

/// Memories similar to the error context, most similar first.
///
/// Memories of `log_file` itself are excluded, so re-analysing a file
/// never recalls its own earlier analysis.
pub async fn find_similar_incidents<S, C>(
    store: &S,
    client: &C,
    log_file: &LogFile,
    entries: &[LogEntry],
    params: &RetrievalParams,
) -> RcaResult<Vec<SimilarIncident>>
where
    S: Store + ?Sized,
    C: AnalysisClient + ?Sized,
{
    let context = build_error_context(entries);
    if context.is_empty() {
        return Ok(Vec::new());
    }

    let query = client.embed(&context).await?;
    similar_to_embedding(store, &query, Some(&log_file.id), params).await
}

/// Threshold and label the nearest memories to `query`.
pub async fn similar_to_embedding<S>(
    store: &S,
    query: &Embedding,
    exclude_log_file: Option<&str>,
    params: &RetrievalParams,
) -> RcaResult<Vec<SimilarIncident>>
where
    S: Store + ?Sized,
{
    let nearest = store
        .nearest_memories(query, params.top_k, exclude_log_file)
        .await
        .map_err(persistence)?;

    let mut incidents = Vec::new();
    for scored in nearest {
        let memory = scored.memory;
        let similarity = query.cosine(&memory.embedding);
        if similarity < params.similarity_threshold {
            continue;
        }

        let filename = match memory.log_file_id.as_deref() {
            Some(id) => match store.get_log_file(id).await {
                Ok(Some(file)) => file.filename,
                Ok(None) => UNKNOWN_FILENAME.to_string(),
                Err(e) => {
                    debug!(log_file_id = %id, error = %e, "filename lookup failed");
                    UNKNOWN_FILENAME.to_string()
                }
            },
            None => UNKNOWN_FILENAME.to_string(),
        };

        incidents.push(SimilarIncident {
            memory_id: memory.id,
            log_file_id: memory.log_file_id,
            filename,
            summary: memory.summary,
            root_cause: memory.root_cause,
            severity: memory.metadata.severity,
            timestamp: memory.created_at,
            similarity,
            relevance: Relevance::from_score(similarity),
        });
    }

    incidents.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(incidents)
}

/// Keywords of `pattern` found in the lowercased context, and whether its
/// root cause was found. An empty root cause never matches.
fn pattern_hits(pattern: &Pattern, context_lower: &str) -> (Vec<String>, bool) {
    let keywords = pattern
        .keywords
        .iter()
        .filter(|k| !k.is_empty() && context_lower.contains(&k.to_lowercase()))
        .cloned()
        .collect();
    let root = pattern.root_cause.trim().to_lowercase();
    let root_hit = !root.is_empty() && context_lower.contains(&root);
    (keywords, root_hit)
}

/// Lexical match confidence of `pattern` against an error context.
pub fn pattern_match_confidence(pattern: &Pattern, context: &str) -> f64 {
    let (keywords, root_hit) = pattern_hits(pattern, &context.to_lowercase());
    score_hits(keywords.len(), root_hit)
}

fn score_hits(keyword_hits: usize, root_hit: bool) -> f64 {
    let mut score = keyword_hits as f64 * KEYWORD_WEIGHT;
    if root_hit {
        score += ROOT_CAUSE_WEIGHT;
    }
    score.min(1.0)
}

/// Human-readable explanation of a match.
pub fn match_reason(keywords: &[String], root_hit: bool) -> String {
    let mut reasons: Vec<String> = keywords
        .iter()
        .map(|k| format!("contains keyword '{}'", k))
        .collect();
    if root_hit {
        reasons.push("similar root cause".to_string());
    }
    if reasons.is_empty() {
        FALLBACK_MATCH_REASON.to_string()
    } else {
        reasons.join(", ")
    }
}

/// Score `patterns` against the error context, keeping those above the
/// threshold, highest first.
pub fn match_patterns(
    patterns: Vec<Pattern>,
    entries: &[LogEntry],
    params: &RetrievalParams,
) -> Vec<PatternMatch> {
    let context = build_error_context(entries).to_lowercase();
    let mut matches: Vec<PatternMatch> = patterns
        .into_iter()
        .filter_map(|pattern| {
            let (keywords, root_hit) = pattern_hits(&pattern, &context);
            let confidence = score_hits(keywords.len(), root_hit);
            (confidence > params.pattern_threshold).then(|| PatternMatch {
                match_reason: match_reason(&keywords, root_hit),
                relevance: Relevance::from_score(confidence),
                confidence,
                pattern,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches
}

pub async fn identify_patterns<S>(
    store: &S,
    entries: &[LogEntry],
    params: &RetrievalParams,
) -> RcaResult<Vec<PatternMatch>>
where
    S: Store + ?Sized,
{
    let patterns = store.list_patterns().await.map_err(persistence)?;
    Ok(match_patterns(patterns, entries, params))
}

/// Boost from high/medium relevance results, capped at 0.5.
pub fn confidence_boost(incidents: &[SimilarIncident], matches: &[PatternMatch]) -> f64 {
    let incident_boost: f64 = incidents
        .iter()
        .map(|i| match i.relevance {
            Relevance::High => INCIDENT_BOOST_HIGH,
            Relevance::Medium => INCIDENT_BOOST_MEDIUM,
            Relevance::Low => 0.0,
        })
        .sum();
    let pattern_boost: f64 = matches
        .iter()
        .map(|m| match m.relevance {
            Relevance::High => PATTERN_BOOST_HIGH,
            Relevance::Medium => PATTERN_BOOST_MEDIUM,
            Relevance::Low => 0.0,
        })
        .sum();
    (incident_boost + pattern_boost).clamp(0.0, MAX_CONFIDENCE_BOOST)
}

/// Render the context block handed to the next analysis call. Empty when
/// there is nothing to say.
pub fn suggested_context(
    incidents: &[SimilarIncident],
    matches: &[PatternMatch],
    boost: f64,
) -> String {
    let mut out = String::new();

    if !incidents.is_empty() {
        out.push_str("SIMILAR PAST INCIDENTS:\n");
        for i in incidents.iter().take(CONTEXT_ITEMS) {
            out.push_str(&format!(
                "- {} ({:.1}% similar): {}\n  Root Cause: {}\n",
                i.filename,
                i.similarity * 100.0,
                i.summary,
                i.root_cause
            ));
        }
        out.push('\n');
    }

    if !matches.is_empty() {
        out.push_str("IDENTIFIED PATTERNS:\n");
        for m in matches.iter().take(CONTEXT_ITEMS) {
            out.push_str(&format!(
                "- {} ({:.1}% confidence): {}\n  Common Fix: {}\n",
                m.pattern.name,
                m.confidence * 100.0,
                m.pattern.root_cause,
                m.pattern.common_fixes.join(", ")
            ));
        }
        out.push('\n');
    }

    if boost > 0.0 {
        out.push_str(&format!("LEARNING CONFIDENCE BOOST: {:.1}%\n", boost * 100.0));
    }

    out
}

async fn feedback_block<S>(
    store: &S,
    incidents: &[SimilarIncident],
    matches: &[PatternMatch],
) -> RcaResult<String>
where
    S: Store + ?Sized,
{
    if incidents.is_empty() && matches.is_empty() {
        return Ok(String::new());
    }

    let mut incident_feedback: Vec<Feedback> = Vec::new();
    for incident in incidents {
        let items = store
            .list_feedback(Some(&incident.memory_id))
            .await
            .map_err(persistence)?;
        incident_feedback.extend(items);
    }

    let pattern_feedback = if matches.is_empty() {
        Vec::new()
    } else {
        let all = store.list_feedback(None).await.map_err(persistence)?;
        matches
            .iter()
            .map(|m| {
                let name = m.pattern.name.clone();
                let items = all
                    .iter()
                    .filter(|f| concerns_pattern(f, &name))
                    .cloned()
                    .collect();
                (name, items)
            })
            .collect()
    };

    Ok(feedback_context(&incident_feedback, &pattern_feedback))
}

/// Gather everything the learning layer knows about these error entries.
///
/// Never fails: each sub-step that errors is logged and contributes an
/// empty part.
pub async fn get_learning_insights<S, C>(
    store: &S,
    client: &C,
    log_file: &LogFile,
    entries: &[LogEntry],
    params: &RetrievalParams,
) -> LearningInsights
where
    S: Store + ?Sized,
    C: AnalysisClient + ?Sized,
{
    let similar_incidents =
        match find_similar_incidents(store, client, log_file, entries, params).await {
            Ok(v) => v,
            Err(e) => {
                warn!(log_file_id = %log_file.id, error = %e, "similar incident lookup failed");
                Vec::new()
            }
        };

    let pattern_matches = match identify_patterns(store, entries, params).await {
        Ok(v) => v,
        Err(e) => {
            warn!(log_file_id = %log_file.id, error = %e, "pattern identification failed");
            Vec::new()
        }
    };

    let learning_metrics = match learning_metrics(store).await {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "learning metrics unavailable");
            LearningMetrics::default()
        }
    };

    let confidence_boost = confidence_boost(&similar_incidents, &pattern_matches);
    let mut context = suggested_context(&similar_incidents, &pattern_matches, confidence_boost);

    match feedback_block(store, &similar_incidents, &pattern_matches).await {
        Ok(block) if !block.is_empty() => {
            if !context.is_empty() {
                context.push('\n');
            }
            context.push_str(&block);
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "feedback context unavailable"),
    }

    debug!(
        log_file_id = %log_file.id,
        similar = similar_incidents.len(),
        patterns = pattern_matches.len(),
        boost = confidence_boost,
        "learning insights computed"
    );

    LearningInsights {
        similar_incidents,
        pattern_matches,
        confidence_boost,
        suggested_context: context,
        learning_metrics,
    }
}
