//! # autolog CLI
//!
//! ## Usage
//!
//! ```bash
//! autolog --config ./config/autolog.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `autolog init` | Create the SQLite database and run schema migrations |
//! | `autolog ingest <path>` | Store a JSON-lines log file |
//! | `autolog files` | List ingested log files |
//! | `autolog analyze <log-file-id>` | Run RCA in-process and print the final job |
//! | `autolog status <job-id>` | Print one job's status |
//! | `autolog jobs <log-file-id>` | List the jobs of a log file |
//! | `autolog insights <log-file-id>` | Similar incidents and pattern matches |
//! | `autolog patterns list\|get\|delete` | Inspect or remove learned patterns |
//! | `autolog metrics` | Learning metrics |
//! | `autolog feedback add\|list\|process\|insights` | Feedback on stored analyses |
//! | `autolog health` | Check the analysis service |
//! | `autolog recover` | Fail jobs left active by an exited process |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use autolog::commands::{self, FeedbackArgs};
use autolog::progress::ProgressMode;
use autolog::{config, ingest, logging, migrate, stats};

/// autolog: log root-cause analysis that learns from every incident.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/autolog.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "autolog",
    about = "autolog: log root-cause analysis that learns from every incident",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/autolog.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Ingest a JSON-lines log file.
    ///
    /// Each line is an object with `timestamp`, `level`, `message` and
    /// optional `error_code`, `service`, `host`, `metadata`. Prints the
    /// stored log file record.
    Ingest {
        path: PathBuf,

        /// Who uploaded the file.
        #[arg(long)]
        uploader: Option<String>,
    },

    /// List ingested log files.
    Files,

    /// Run root-cause analysis for a log file and wait for it.
    ///
    /// Only ERROR and FATAL entries are analyzed. A file without any gets
    /// a "No Incident" result without calling the analysis service.
    Analyze {
        log_file_id: String,

        /// Progress output on stderr.
        /// Defaults to human when stderr is a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show the status of a job.
    Status { job_id: String },

    /// List the jobs of a log file.
    Jobs { log_file_id: String },

    /// Show learning insights for a log file.
    Insights { log_file_id: String },

    /// Inspect learned patterns.
    Patterns {
        #[command(subcommand)]
        action: PatternAction,
    },

    /// Show learning metrics.
    Metrics,

    /// Record and apply feedback on stored analyses.
    Feedback {
        #[command(subcommand)]
        action: FeedbackAction,
    },

    /// Check that the analysis service is reachable.
    Health,

    /// Mark jobs left pending or running by an exited process as failed.
    Recover,
}

#[derive(Subcommand)]
enum PatternAction {
    /// List patterns, highest confidence first.
    List,
    /// Show a pattern with its examples.
    Get { id: String },
    /// Delete a pattern and its examples.
    Delete { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Verdict {
    Correct,
    Incorrect,
}

#[derive(Subcommand)]
enum FeedbackAction {
    /// Judge a stored analysis (memory).
    Add {
        memory_id: String,

        verdict: Verdict,

        #[arg(long)]
        user: Option<String>,

        /// What the analysis should have said.
        #[arg(long)]
        correction: Option<String>,

        /// general, root_cause, pattern, or severity.
        #[arg(long = "type", default_value = "general")]
        feedback_type: String,

        /// Pattern this feedback is about.
        #[arg(long)]
        pattern: Option<String>,

        /// Root cause section this feedback is about.
        #[arg(long)]
        section: Option<String>,

        /// Signed confidence change applied to `--pattern` when processed.
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        impact: f64,
    },
    /// List feedback for a memory with its summary.
    List { memory_id: String },
    /// Apply unprocessed feedback to pattern confidence.
    Process,
    /// Feedback grouped by pattern and root cause section.
    Insights,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path, uploader } => {
            ingest::run_ingest(&cfg, &path, uploader).await?;
        }
        Commands::Files => {
            stats::run_files(&cfg).await?;
        }
        Commands::Analyze {
            log_file_id,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_analyze(&cfg, &log_file_id, mode).await?;
        }
        Commands::Status { job_id } => {
            commands::run_status(&cfg, &job_id).await?;
        }
        Commands::Jobs { log_file_id } => {
            commands::run_jobs(&cfg, &log_file_id).await?;
        }
        Commands::Insights { log_file_id } => {
            commands::run_insights(&cfg, &log_file_id).await?;
        }
        Commands::Patterns { action } => match action {
            PatternAction::List => commands::run_patterns_list(&cfg).await?,
            PatternAction::Get { id } => commands::run_patterns_get(&cfg, &id).await?,
            PatternAction::Delete { id } => commands::run_patterns_delete(&cfg, &id).await?,
        },
        Commands::Metrics => {
            stats::run_metrics(&cfg).await?;
        }
        Commands::Feedback { action } => match action {
            FeedbackAction::Add {
                memory_id,
                verdict,
                user,
                correction,
                feedback_type,
                pattern,
                section,
                impact,
            } => {
                let args = FeedbackArgs {
                    memory_id,
                    is_correct: matches!(verdict, Verdict::Correct),
                    user,
                    correction,
                    feedback_type,
                    pattern,
                    section,
                    impact,
                };
                commands::run_feedback_add(&cfg, args).await?;
            }
            FeedbackAction::List { memory_id } => {
                commands::run_feedback_list(&cfg, &memory_id).await?;
            }
            FeedbackAction::Process => commands::run_feedback_process(&cfg).await?,
            FeedbackAction::Insights => commands::run_feedback_insights(&cfg).await?,
        },
        Commands::Health => {
            commands::run_health(&cfg).await?;
        }
        Commands::Recover => {
            commands::run_recover(&cfg).await?;
        }
    }

    Ok(())
}
