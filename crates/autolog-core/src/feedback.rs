//! User feedback on stored analyses.
//!
//! Feedback is a correctness judgment on a [`Memory`](crate::models::Memory),
//! optionally scoped to a pattern or a root-cause section. It feeds back
//! into learning in two ways:
//!
//! - [`feedback_context`] renders a text block appended to the suggested
//!   context of the next analysis.
//! - [`process_pending_feedback`] applies each unprocessed pattern-scoped
//!   record's `confidence_impact` to the named pattern.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{persistence, RcaError, RcaResult};
use crate::models::{new_id, now_ts, Feedback, FeedbackType};
use crate::store::Store;

/// Largest absolute confidence impact a single feedback record may carry.
pub const MAX_CONFIDENCE_IMPACT: f64 = 1.0;

const FEEDBACK_CONFIDENCE_SPAN: f64 = 0.8;
const FEEDBACK_ADJUSTMENT_SPAN: f64 = 0.3;
const MIN_ADJUSTED_CONFIDENCE: f64 = 0.1;
const MAX_CORRECTIONS_SHOWN: usize = 3;
const GENERAL_KEY: &str = "general";

/// Unsaved feedback as submitted by a user.
#[derive(Debug, Clone)]
pub struct FeedbackDraft {
    pub memory_id: String,
    pub user_id: Option<String>,
    pub is_correct: bool,
    pub correction: Option<String>,
    pub feedback_type: FeedbackType,
    pub pattern_name: Option<String>,
    pub root_cause_section: Option<String>,
    pub confidence_impact: f64,
}

impl FeedbackDraft {
    pub fn new(memory_id: impl Into<String>, is_correct: bool) -> Self {
        Self {
            memory_id: memory_id.into(),
            user_id: None,
            is_correct,
            correction: None,
            feedback_type: FeedbackType::General,
            pattern_name: None,
            root_cause_section: None,
            confidence_impact: 0.0,
        }
    }

    pub fn validate(&self) -> RcaResult<()> {
        if self.memory_id.trim().is_empty() {
            return Err(RcaError::validation("feedback requires a memory id"));
        }
        if !self.confidence_impact.is_finite()
            || self.confidence_impact.abs() > MAX_CONFIDENCE_IMPACT
        {
            return Err(RcaError::validation(format!(
                "confidence impact must be within [-{max}, {max}], got {}",
                self.confidence_impact,
                max = MAX_CONFIDENCE_IMPACT
            )));
        }
        if self.feedback_type == FeedbackType::Pattern
            && self.pattern_name.as_deref().map_or(true, |n| n.trim().is_empty())
        {
            return Err(RcaError::validation(
                "pattern feedback requires a pattern name",
            ));
        }
        Ok(())
    }

    pub fn into_feedback(self, now: i64) -> Feedback {
        Feedback {
            id: new_id(),
            memory_id: self.memory_id,
            user_id: self.user_id,
            is_correct: self.is_correct,
            correction: self.correction.filter(|c| !c.trim().is_empty()),
            feedback_type: self.feedback_type,
            pattern_name: self.pattern_name.filter(|n| !n.trim().is_empty()),
            root_cause_section: self.root_cause_section.filter(|s| !s.trim().is_empty()),
            confidence_impact: self.confidence_impact,
            processed: false,
            processed_at: None,
            created_at: now,
        }
    }
}

/// Counts and corrections over a set of feedback records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSummary {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    /// Corrections attached to negative feedback, in submission order.
    pub corrections: Vec<String>,
    pub confidence_score: f64,
}

impl FeedbackSummary {
    /// Share of positive feedback, or `None` when there is none.
    pub fn ratio(&self) -> Option<f64> {
        (self.total > 0).then(|| self.positive as f64 / self.total as f64)
    }
}

/// `0.5 + (ratio - 0.5) * 0.8`; 0.5 with no feedback.
pub fn confidence_score(positive: usize, negative: usize) -> f64 {
    let total = positive + negative;
    if total == 0 {
        return 0.5;
    }
    let ratio = positive as f64 / total as f64;
    0.5 + (ratio - 0.5) * FEEDBACK_CONFIDENCE_SPAN
}

pub fn summarize(feedback: &[Feedback]) -> FeedbackSummary {
    let mut summary = FeedbackSummary::default();
    for f in feedback {
        summary.total += 1;
        if f.is_correct {
            summary.positive += 1;
        } else {
            summary.negative += 1;
            if let Some(c) = &f.correction {
                summary.corrections.push(c.clone());
            }
        }
    }
    summary.confidence_score = confidence_score(summary.positive, summary.negative);
    summary
}

/// Nudge `base` by at most ±0.15 toward the feedback ratio, clamped to
/// `[0.1, 1.0]`. Returns `base` unchanged when there is no feedback.
pub fn adjusted_confidence(base: f64, summary: &FeedbackSummary) -> f64 {
    match summary.ratio() {
        None => base,
        Some(ratio) => (base + (ratio - 0.5) * FEEDBACK_ADJUSTMENT_SPAN)
            .clamp(MIN_ADJUSTED_CONFIDENCE, 1.0),
    }
}

/// Feedback grouped by pattern and root-cause section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackInsight {
    pub pattern_name: String,
    pub root_cause: String,
    pub positive: usize,
    pub negative: usize,
    pub corrections: Vec<String>,
    pub confidence_score: f64,
}

/// Group feedback by `(pattern, root cause section)`. Records missing
/// either part use `"general"` for it. Groups keep first-seen order.
pub fn feedback_insights(feedback: &[Feedback]) -> Vec<FeedbackInsight> {
    let mut groups: Vec<(String, String, Vec<Feedback>)> = Vec::new();
    for f in feedback {
        let pattern = f.pattern_name.clone().unwrap_or_else(|| GENERAL_KEY.to_string());
        let root_cause = f
            .root_cause_section
            .clone()
            .unwrap_or_else(|| GENERAL_KEY.to_string());
        match groups
            .iter_mut()
            .find(|(p, r, _)| *p == pattern && *r == root_cause)
        {
            Some((_, _, items)) => items.push(f.clone()),
            None => groups.push((pattern, root_cause, vec![f.clone()])),
        }
    }

    groups
        .into_iter()
        .map(|(pattern_name, root_cause, items)| {
            let s = summarize(&items);
            FeedbackInsight {
                pattern_name,
                root_cause,
                positive: s.positive,
                negative: s.negative,
                corrections: s.corrections,
                confidence_score: s.confidence_score,
            }
        })
        .collect()
}

/// Whether a feedback record concerns the named pattern: scoped to it, or
/// mentioning it in a correction.
pub fn concerns_pattern(feedback: &Feedback, name: &str) -> bool {
    feedback.pattern_name.as_deref() == Some(name)
        || feedback
            .correction
            .as_deref()
            .is_some_and(|c| c.contains(name))
}

/// Render the feedback block appended to the suggested context.
///
/// `incident_feedback` is the feedback on the similar incidents' memories;
/// `pattern_feedback` pairs each matched pattern name with its feedback.
/// Returns an empty string when there is nothing to report.
pub fn feedback_context(
    incident_feedback: &[Feedback],
    pattern_feedback: &[(String, Vec<Feedback>)],
) -> String {
    let mut out = String::new();

    if !incident_feedback.is_empty() {
        let s = summarize(incident_feedback);
        out.push_str("USER FEEDBACK FROM SIMILAR INCIDENTS:\n");
        out.push_str(&format!("- Positive feedback: {}\n", s.positive));
        out.push_str(&format!("- Negative feedback: {}\n", s.negative));
        if !s.corrections.is_empty() {
            out.push_str("- User corrections:\n");
            for c in s.corrections.iter().take(MAX_CORRECTIONS_SHOWN) {
                out.push_str(&format!("  * {}\n", c));
            }
        }
        out.push('\n');
    }

    for (name, items) in pattern_feedback {
        if items.is_empty() {
            continue;
        }
        let s = summarize(items);
        out.push_str(&format!("PATTERN '{}' FEEDBACK:\n", name));
        out.push_str(&format!(
            "- Positive: {}, Negative: {}\n",
            s.positive, s.negative
        ));
        if s.negative > s.positive {
            out.push_str("- WARNING: This pattern has received negative feedback\n");
        } else if s.positive > 0 {
            out.push_str("- This pattern has received positive feedback\n");
        }
        out.push('\n');
    }

    out
}

/// Validate and store feedback on an existing memory.
///
/// # Errors
///
/// `Validation` for a malformed draft, `NotFound` for an unknown memory.
pub async fn submit_feedback<S>(store: &S, draft: FeedbackDraft) -> RcaResult<Feedback>
where
    S: Store + ?Sized,
{
    draft.validate()?;
    store
        .get_memory(&draft.memory_id)
        .await
        .map_err(persistence)?
        .ok_or_else(|| RcaError::not_found("memory", draft.memory_id.clone()))?;

    let feedback = draft.into_feedback(now_ts());
    store.insert_feedback(&feedback).await.map_err(persistence)?;
    debug!(feedback_id = %feedback.id, memory_id = %feedback.memory_id, "feedback stored");
    Ok(feedback)
}

/// Result of one [`process_pending_feedback`] pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub processed: usize,
    /// Records whose impact moved a pattern's confidence.
    pub adjusted: usize,
    /// Pattern-scoped records whose pattern no longer exists.
    pub missing_patterns: usize,
}

/// Apply every unprocessed feedback record and mark it processed.
///
/// Pattern-scoped records with a non-zero impact adjust the named
/// pattern's confidence through [`Store::adjust_pattern_confidence`].
pub async fn process_pending_feedback<S>(store: &S) -> RcaResult<ProcessOutcome>
where
    S: Store + ?Sized,
{
    let pending: Vec<Feedback> = store
        .list_feedback(None)
        .await
        .map_err(persistence)?
        .into_iter()
        .filter(|f| !f.processed)
        .collect();

    let mut outcome = ProcessOutcome::default();
    for f in pending {
        let now = now_ts();
        if let Some(name) = f.pattern_name.as_deref() {
            if f.confidence_impact != 0.0 {
                let updated = store
                    .adjust_pattern_confidence(name, f.confidence_impact, now)
                    .await
                    .map_err(persistence)?;
                match updated {
                    Some(_) => outcome.adjusted += 1,
                    None => {
                        warn!(feedback_id = %f.id, pattern = %name, "feedback names an unknown pattern");
                        outcome.missing_patterns += 1;
                    }
                }
            }
        }
        store
            .mark_feedback_processed(&f.id, now)
            .await
            .map_err(persistence)?;
        outcome.processed += 1;
    }
    Ok(outcome)
}
