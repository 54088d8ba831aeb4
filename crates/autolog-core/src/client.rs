//! Analysis client trait.
//!
//! The job engine and the learning layer reach the external language-model
//! service only through [`AnalysisClient`]. Every call may be slow and may
//! fail; callers never assume availability. Concrete clients (Ollama, a
//! disabled stub, a timeout wrapper) live in the `autolog` app crate.

use async_trait::async_trait;

use crate::analysis::AnalysisResult;
use crate::embedding::Embedding;
use crate::error::RcaResult;
use crate::models::{LogEntry, LogFile};

/// Inputs for one analysis call.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub log_file: &'a LogFile,
    pub entries: &'a [LogEntry],
    /// Suggested context from the learning layer, if any.
    pub learning_context: Option<&'a str>,
    /// 1-based chunk number.
    pub chunk: usize,
    pub total_chunks: usize,
}

#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Short identifier used in logs (e.g. `"ollama"`).
    fn name(&self) -> &str;

    /// Analyze one chunk of error entries.
    async fn analyze(&self, request: AnalysisRequest<'_>) -> RcaResult<AnalysisResult>;

    /// Embed a text into a vector.
    async fn embed(&self, text: &str) -> RcaResult<Embedding>;

    /// Verify the service is reachable.
    async fn health_check(&self) -> RcaResult<()>;
}
