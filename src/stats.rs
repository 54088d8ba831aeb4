//! Learning metrics and log file overview.
//!
//! `autolog metrics` summarizes what the learning layer has accumulated:
//! stored analyses, patterns, re-observations, and the feedback-derived
//! accuracy figure. `autolog files` lists ingested log files with their
//! parse and RCA state.

use anyhow::Result;

use autolog_core::models::LogFile;

use crate::config::Config;
use crate::service;

/// Run the metrics command: compute learning metrics and print a summary.
pub async fn run_metrics(config: &Config) -> Result<()> {
    let service = service::open(config).await?;
    let metrics = service.get_learning_metrics().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("autolog Learning Metrics");
    println!("========================");
    println!();
    println!("  Database:             {}", config.db.path.display());
    println!("  Size:                 {}", format_bytes(db_size));
    println!();
    println!("  Analyses stored:      {}", metrics.total_analyses);
    println!("  Patterns:             {}", metrics.total_patterns);
    println!("  Pattern matches:      {}", metrics.pattern_matches);
    println!(
        "  Average confidence:   {}",
        format_percent(metrics.average_confidence)
    );
    println!("  Learning rate:        {}", format_percent(metrics.learning_rate));
    println!(
        "  Accuracy improvement: {:+.1}%",
        metrics.accuracy_improvement * 100.0
    );
    println!();
    Ok(())
}

/// Run the files command: list ingested log files.
pub async fn run_files(config: &Config) -> Result<()> {
    let service = service::open(config).await?;
    let files = service.list_log_files().await?;

    if files.is_empty() {
        println!("No log files ingested.");
        return Ok(());
    }

    println!(
        "  {:<36} {:<24} {:>8} {:>7} {:>9}  {:<11} {:<11} {}",
        "ID", "FILE", "SIZE", "ENTRIES", "ERRORS", "PARSE", "RCA", "INGESTED"
    );
    println!("  {}", "-".repeat(128));
    for f in &files {
        print_file_row(f);
    }
    println!();
    Ok(())
}

fn print_file_row(f: &LogFile) {
    println!(
        "  {:<36} {:<24} {:>8} {:>7} {:>9}  {:<11} {:<11} {}",
        f.id,
        truncate(&f.filename, 24),
        format_bytes(f.size.max(0) as u64),
        f.entry_count,
        f.error_count,
        f.processing_status.as_str(),
        f.rca_status.as_str(),
        format_ts_relative(f.created_at)
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

fn format_percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// "just now", "5 mins ago", "3 days ago"; absolute after 30 days or for
/// timestamps in the future.
fn format_ts_relative(ts: i64) -> String {
    const STEPS: [(i64, &str); 3] = [(86_400, "day"), (3_600, "hour"), (60, "min")];

    let delta = chrono::Utc::now().timestamp() - ts;
    if !(0..86_400 * 30).contains(&delta) {
        return format_ts_iso(ts);
    }
    for (secs, name) in STEPS {
        if delta >= secs {
            let n = delta / secs;
            return format!("{} {}{} ago", n, name, if n == 1 { "" } else { "s" });
        }
    }
    "just now".to_string()
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
