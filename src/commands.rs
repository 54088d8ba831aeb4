//! CLI handlers for jobs, learning, patterns, and feedback.
//!
//! Commands that return records print them as pretty JSON on stdout.
//! Progress and logs go to stderr.

use anyhow::{bail, Result};
use serde::Serialize;

use autolog_core::feedback::{summarize, FeedbackDraft, FeedbackSummary};
use autolog_core::models::{Feedback, FeedbackType, JobStatus};

use crate::config::Config;
use crate::progress::ProgressMode;
use crate::service;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============ Jobs ============

/// `autolog analyze`: run RCA for a log file in-process and print the
/// final job status. Fails when the job ends `failed`.
pub async fn run_analyze(config: &Config, log_file_id: &str, progress: ProgressMode) -> Result<()> {
    let service = service::open(config)
        .await?
        .with_reporter(progress.reporter());

    let handle = service.request_analysis(log_file_id).await?;
    let job_id = handle.wait().await?;

    let status = service.get_status(&job_id).await?;
    print_json(&status)?;

    if status.status == JobStatus::Failed {
        bail!(
            "job {} failed: {}",
            job_id,
            status.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

pub async fn run_status(config: &Config, job_id: &str) -> Result<()> {
    let service = service::open(config).await?;
    print_json(&service.get_status(job_id).await?)
}

pub async fn run_jobs(config: &Config, log_file_id: &str) -> Result<()> {
    let service = service::open(config).await?;
    print_json(&service.list_jobs(log_file_id).await?)
}

pub async fn run_recover(config: &Config) -> Result<()> {
    let service = service::open(config).await?;
    let n = service.recover().await?;
    println!("recovered {} interrupted job{}", n, if n == 1 { "" } else { "s" });
    Ok(())
}

pub async fn run_health(config: &Config) -> Result<()> {
    let service = service::open(config).await?;
    let report = service.health().await;
    print_json(&report)?;
    if !report.ok {
        bail!(
            "{} is unavailable: {}",
            report.client,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

// ============ Learning ============

pub async fn run_insights(config: &Config, log_file_id: &str) -> Result<()> {
    let service = service::open(config).await?;
    print_json(&service.get_learning_insights(log_file_id).await?)
}

pub async fn run_patterns_list(config: &Config) -> Result<()> {
    let service = service::open(config).await?;
    let patterns = service.get_patterns().await?;

    if patterns.is_empty() {
        println!("No patterns learned yet.");
        return Ok(());
    }

    println!(
        "  {:<36} {:<32} {:>6} {:>10}  {}",
        "ID", "NAME", "SEEN", "CONFIDENCE", "SEVERITY"
    );
    println!("  {}", "-".repeat(100));
    for p in &patterns {
        println!(
            "  {:<36} {:<32} {:>6} {:>9.0}%  {}",
            p.id,
            p.name,
            p.occurrence_count,
            p.confidence * 100.0,
            p.severity.as_str()
        );
    }
    Ok(())
}

pub async fn run_patterns_get(config: &Config, id: &str) -> Result<()> {
    let service = service::open(config).await?;
    print_json(&service.get_pattern_by_id(id).await?)
}

pub async fn run_patterns_delete(config: &Config, id: &str) -> Result<()> {
    let service = service::open(config).await?;
    service.delete_pattern(id).await?;
    println!("deleted pattern {}", id);
    Ok(())
}

// ============ Feedback ============

/// Arguments of `autolog feedback add`.
#[derive(Debug, Clone)]
pub struct FeedbackArgs {
    pub memory_id: String,
    pub is_correct: bool,
    pub user: Option<String>,
    pub correction: Option<String>,
    pub feedback_type: String,
    pub pattern: Option<String>,
    pub section: Option<String>,
    pub impact: f64,
}

impl FeedbackArgs {
    pub fn into_draft(self) -> Result<FeedbackDraft> {
        let feedback_type: FeedbackType = self.feedback_type.parse()?;
        let mut draft = FeedbackDraft::new(self.memory_id, self.is_correct);
        draft.user_id = self.user;
        draft.correction = self.correction;
        draft.feedback_type = feedback_type;
        draft.pattern_name = self.pattern;
        draft.root_cause_section = self.section;
        draft.confidence_impact = self.impact;
        Ok(draft)
    }
}

pub async fn run_feedback_add(config: &Config, args: FeedbackArgs) -> Result<()> {
    let service = service::open(config).await?;
    let feedback = service.submit_feedback(args.into_draft()?).await?;
    print_json(&feedback)
}

/// Feedback records of one memory together with their summary.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackListing {
    summary: FeedbackSummary,
    feedback: Vec<Feedback>,
}

pub async fn run_feedback_list(config: &Config, memory_id: &str) -> Result<()> {
    let service = service::open(config).await?;
    let feedback = service.list_feedback(memory_id).await?;
    let summary = summarize(&feedback);
    print_json(&FeedbackListing { summary, feedback })
}

pub async fn run_feedback_process(config: &Config) -> Result<()> {
    let service = service::open(config).await?;
    print_json(&service.process_pending_feedback().await?)
}

pub async fn run_feedback_insights(config: &Config) -> Result<()> {
    let service = service::open(config).await?;
    print_json(&service.feedback_insights().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(feedback_type: &str) -> FeedbackArgs {
        FeedbackArgs {
            memory_id: "m1".to_string(),
            is_correct: false,
            user: Some("ops".to_string()),
            correction: Some("It was DNS".to_string()),
            feedback_type: feedback_type.to_string(),
            pattern: Some("Connection timeout".to_string()),
            section: None,
            impact: -0.2,
        }
    }

    #[test]
    fn test_feedback_args_into_draft() {
        let draft = args("pattern").into_draft().unwrap();
        assert_eq!(draft.memory_id, "m1");
        assert!(!draft.is_correct);
        assert_eq!(draft.feedback_type, FeedbackType::Pattern);
        assert_eq!(draft.pattern_name.as_deref(), Some("Connection timeout"));
        assert!((draft.confidence_impact + 0.2).abs() < 1e-9);
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_feedback_args_reject_unknown_type() {
        assert!(args("vibes").into_draft().is_err());
    }
}
