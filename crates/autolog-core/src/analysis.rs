//! Analysis results: the structured output of one external analysis call,
//! its normalization, and the running aggregate across chunks.
//!
//! # Response normalization
//!
//! | Field | Rule |
//! |-------|------|
//! | `summary` | empty → `"Error analysis completed but no summary generated."` |
//! | `rootCause` | empty → `"Unable to determine root cause"` |
//! | `severity` | low/minor, medium/moderate, high/major, critical/fatal; anything else → medium |
//! | finding `severity` | critical/fatal/severe → critical; anything else → non-critical |
//!
//! Model output is tolerated inside markdown fences or surrounding prose:
//! [`extract_json`] keeps the first `{` through the last `}`.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{RcaError, RcaResult};

pub const NO_INCIDENT: &str = "No Incident";
const EMPTY_SUMMARY: &str = "Error analysis completed but no summary generated.";
const EMPTY_ROOT_CAUSE: &str = "Unable to determine root cause";

/// Overall incident severity. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" | "minor" => Severity::Low,
            "medium" | "moderate" => Severity::Medium,
            "high" | "major" => Severity::High,
            "critical" | "fatal" => Severity::Critical,
            _ => Severity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Severity of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FindingSeverity {
    #[serde(rename = "non-critical")]
    NonCritical,
    #[serde(rename = "critical")]
    Critical,
}

impl FindingSeverity {
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "critical" | "fatal" | "severe" => FindingSeverity::Critical,
            _ => FindingSeverity::NonCritical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingSeverity::Critical => "critical",
            FindingSeverity::NonCritical => "non-critical",
        }
    }
}

/// One error pattern identified inside an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFinding {
    pub error_pattern: String,
    pub error_count: u32,
    pub first_occurrence: String,
    pub last_occurrence: String,
    pub severity: FindingSeverity,
    pub root_cause: String,
    pub impact: String,
    pub fix: String,
    pub related_errors: Vec<String>,
}

/// Structured result of analyzing a set of error entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_type: Option<String>,
    pub root_cause: String,
    pub recommendations: Vec<String>,
    pub error_analysis: Vec<ErrorFinding>,
    pub critical_errors: u32,
    pub non_critical_errors: u32,
}

impl AnalysisResult {
    pub fn error_count(&self) -> u32 {
        self.critical_errors.saturating_add(self.non_critical_errors)
    }
}

/// Fixed analysis for a log file without any `ERROR` or `FATAL` entries.
///
/// Never calls the client and never produces findings.
pub fn no_incident_analysis(filename: &str) -> AnalysisResult {
    AnalysisResult {
        summary: format!(
            "Log file '{}' contains no ERROR or FATAL entries. System appears to be functioning normally.",
            filename
        ),
        severity: Severity::Low,
        incident_type: Some(NO_INCIDENT.to_string()),
        root_cause: "No errors detected".to_string(),
        recommendations: vec![
            "Continue monitoring for any new errors".to_string(),
            "Review INFO and WARNING logs for potential issues".to_string(),
        ],
        error_analysis: Vec::new(),
        critical_errors: 0,
        non_critical_errors: 0,
    }
}

/// Strip markdown fences and surrounding prose, returning the outermost
/// JSON object, if any.
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    summary: Option<String>,
    severity: Option<String>,
    incident_type: Option<String>,
    root_cause: Option<String>,
    recommendations: Option<Vec<String>>,
    error_analysis: Option<Vec<RawFinding>>,
    #[serde(default, deserialize_with = "lenient_count")]
    critical_errors: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    non_critical_errors: u32,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawFinding {
    error_pattern: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    error_count: u32,
    first_occurrence: Option<String>,
    last_occurrence: Option<String>,
    severity: Option<String>,
    root_cause: Option<String>,
    impact: Option<String>,
    fix: Option<String>,
    related_errors: Option<Vec<String>>,
}

/// Accept counts sent as numbers, numeric strings, or null.
fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .unwrap_or(0)
            .min(u32::MAX as u64) as u32,
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn non_empty(value: Option<String>, fallback: &str) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => fallback.to_string(),
    }
}

/// Parse raw model output into a normalized [`AnalysisResult`].
///
/// # Errors
///
/// [`RcaError::Upstream`] when no JSON object can be found or it does not
/// match the expected shape.
pub fn parse_analysis_response(response: &str) -> RcaResult<AnalysisResult> {
    let json = extract_json(response).ok_or_else(|| {
        RcaError::upstream(format!(
            "model did not return JSON: {:?}",
            response.chars().take(200).collect::<String>()
        ))
    })?;

    let raw: RawAnalysis = serde_json::from_str(json)
        .map_err(|e| RcaError::upstream(format!("failed to parse analysis JSON: {}", e)))?;

    let error_analysis = raw
        .error_analysis
        .unwrap_or_default()
        .into_iter()
        .map(|f| ErrorFinding {
            error_pattern: f.error_pattern.unwrap_or_default().trim().to_string(),
            error_count: f.error_count,
            first_occurrence: f.first_occurrence.unwrap_or_default(),
            last_occurrence: f.last_occurrence.unwrap_or_default(),
            severity: FindingSeverity::normalize(f.severity.as_deref().unwrap_or_default()),
            root_cause: f.root_cause.unwrap_or_default(),
            impact: f.impact.unwrap_or_default(),
            fix: f.fix.unwrap_or_default(),
            related_errors: f.related_errors.unwrap_or_default(),
        })
        .collect();

    Ok(AnalysisResult {
        summary: non_empty(raw.summary, EMPTY_SUMMARY),
        severity: Severity::normalize(raw.severity.as_deref().unwrap_or_default()),
        incident_type: raw.incident_type.filter(|t| !t.trim().is_empty()),
        root_cause: non_empty(raw.root_cause, EMPTY_ROOT_CAUSE),
        recommendations: raw.recommendations.unwrap_or_default(),
        error_analysis,
        critical_errors: raw.critical_errors,
        non_critical_errors: raw.non_critical_errors,
    })
}

/// Running aggregate over successful chunk results.
///
/// Findings are merged by error-pattern label (case-insensitive), counters
/// are summed, severity is the maximum seen, and summary and root cause
/// come from the latest chunk. Recommendations keep first-seen order
/// without duplicates.
#[derive(Debug, Default)]
pub struct ChunkAggregate {
    merged: Option<AnalysisResult>,
    partials: Vec<AnalysisResult>,
}

impl ChunkAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.partials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }

    pub fn push(&mut self, result: AnalysisResult) {
        match self.merged.as_mut() {
            None => {
                let mut first = result.clone();
                first.error_analysis = Vec::new();
                for finding in &result.error_analysis {
                    merge_finding(&mut first.error_analysis, finding);
                }
                let recommendations = std::mem::take(&mut first.recommendations);
                for r in recommendations {
                    push_unique(&mut first.recommendations, r);
                }
                self.merged = Some(first);
            }
            Some(agg) => {
                agg.summary = result.summary.clone();
                agg.root_cause = result.root_cause.clone();
                agg.severity = agg.severity.max(result.severity);
                if result.incident_type.is_some() {
                    agg.incident_type = result.incident_type.clone();
                }
                agg.critical_errors = agg.critical_errors.saturating_add(result.critical_errors);
                agg.non_critical_errors = agg
                    .non_critical_errors
                    .saturating_add(result.non_critical_errors);
                for r in &result.recommendations {
                    push_unique(&mut agg.recommendations, r.clone());
                }
                for finding in &result.error_analysis {
                    merge_finding(&mut agg.error_analysis, finding);
                }
            }
        }
        self.partials.push(result);
    }

    /// The merged result and the partials in push order, or `None` when
    /// no chunk succeeded.
    pub fn finish(self) -> Option<(AnalysisResult, Vec<AnalysisResult>)> {
        self.merged.map(|merged| (merged, self.partials))
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn merge_finding(findings: &mut Vec<ErrorFinding>, incoming: &ErrorFinding) {
    let key = incoming.error_pattern.trim().to_lowercase();
    let existing = findings
        .iter_mut()
        .find(|f| f.error_pattern.trim().to_lowercase() == key);

    match existing {
        None => findings.push(incoming.clone()),
        Some(f) => {
            f.error_count = f.error_count.saturating_add(incoming.error_count);
            if f.first_occurrence.is_empty() {
                f.first_occurrence = incoming.first_occurrence.clone();
            }
            if !incoming.last_occurrence.is_empty() {
                f.last_occurrence = incoming.last_occurrence.clone();
            }
            f.severity = f.severity.max(incoming.severity);
            if f.root_cause.is_empty() {
                f.root_cause = incoming.root_cause.clone();
            }
            if f.impact.is_empty() {
                f.impact = incoming.impact.clone();
            }
            if f.fix.is_empty() {
                f.fix = incoming.fix.clone();
            }
            for related in &incoming.related_errors {
                push_unique(&mut f.related_errors, related.clone());
            }
        }
    }
}
