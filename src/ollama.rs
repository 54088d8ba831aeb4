//! Analysis client implementations.
//!
//! Provides the concrete [`AnalysisClient`]s used by the app:
//! - **[`OllamaClient`]**: calls a local Ollama server for generation
//!   (`POST /api/generate`), embeddings (`POST /api/embeddings`), and health
//!   (`GET /api/tags`), with retry and backoff.
//! - **[`DisabledClient`]**: fails every call; used when `llm.provider = "disabled"`.
//! - **[`TimedClient`]**: wraps any client and bounds each call with a timeout.
//!
//! # Provider Selection
//!
//! Use [`create_client`] to build the configured client, already wrapped in
//! a [`TimedClient`] using `jobs.call_timeout_secs`:
//!
//! ```rust,no_run
//! # use autolog::config::parse_config;
//! # use autolog::ollama::create_client;
//! # use autolog_core::client::AnalysisClient;
//! let config = parse_config("[db]\npath = \"a.sqlite\"\n[llm]\nprovider = \"disabled\"\n").unwrap();
//! let client = create_client(&config).unwrap();
//! assert_eq!(client.name(), "disabled");
//! ```
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use autolog_core::analysis::{parse_analysis_response, AnalysisResult};
use autolog_core::client::{AnalysisClient, AnalysisRequest};
use autolog_core::embedding::Embedding;
use autolog_core::error::{RcaError, RcaResult};
use autolog_core::retrieval::build_error_context;

use crate::config::{Config, LlmConfig};

// ============ Ollama ============

/// Analysis client backed by an Ollama server.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    embed_model: String,
    max_retries: u32,
    temperature: f64,
    top_p: f64,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embed_model: config.embed_model.clone(),
            max_retries: config.max_retries,
            temperature: config.temperature,
            top_p: config.top_p,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body with retry/backoff and return the JSON response.
    async fn post_json(&self, path: &str, body: &serde_json::Value) -> RcaResult<serde_json::Value> {
        let url = self.url(path);
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.http.post(&url).json(body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<serde_json::Value>().await.map_err(|e| {
                            RcaError::upstream(format!("invalid response from {}: {}", path, e))
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%status, attempt, path, "ollama request failed, retrying");
                        last_err = Some(format!("Ollama API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429): don't retry
                    return Err(RcaError::upstream(format!(
                        "Ollama API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    warn!(error = %e, attempt, path, "ollama request error, retrying");
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(RcaError::upstream(last_err.unwrap_or_else(|| {
            format!("Ollama request to {} failed after retries", path)
        })))
    }
}

#[async_trait]
impl AnalysisClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn analyze(&self, request: AnalysisRequest<'_>) -> RcaResult<AnalysisResult> {
        let prompt = build_analysis_prompt(&request);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "top_p": self.top_p,
            },
        });

        debug!(
            log_file_id = %request.log_file.id,
            chunk = request.chunk,
            total_chunks = request.total_chunks,
            entries = request.entries.len(),
            "requesting analysis"
        );

        let json = self.post_json("/api/generate", &body).await?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| RcaError::upstream("Invalid Ollama response: missing response field"))?;

        parse_analysis_response(text)
    }

    async fn embed(&self, text: &str) -> RcaResult<Embedding> {
        let body = serde_json::json!({
            "model": self.embed_model,
            "prompt": text,
        });
        let json = self.post_json("/api/embeddings", &body).await?;
        parse_embedding_response(&json)
    }

    async fn health_check(&self) -> RcaResult<()> {
        let response = self
            .http
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|e| RcaError::upstream(format!("Ollama unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(RcaError::upstream(format!(
                "Ollama health check returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Extract `embedding` from an Ollama embeddings response.
fn parse_embedding_response(json: &serde_json::Value) -> RcaResult<Embedding> {
    let values = json
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| RcaError::upstream("Invalid Ollama response: missing embedding"))?;

    let vec: Vec<f32> = values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect();

    if vec.is_empty() {
        return Err(RcaError::upstream("Ollama returned an empty embedding"));
    }
    Ok(Embedding::new(vec))
}

/// Build the generation prompt for one chunk.
pub fn build_analysis_prompt(request: &AnalysisRequest<'_>) -> String {
    let file = request.log_file;
    let time_range = match (request.entries.first(), request.entries.last()) {
        (Some(first), Some(last)) => format!(
            "{} to {}",
            first.timestamp.format("%Y-%m-%d %H:%M:%S"),
            last.timestamp.format("%Y-%m-%d %H:%M:%S")
        ),
        _ => "unknown".to_string(),
    };

    let mut prompt = String::new();
    prompt.push_str(
        "You are a site reliability engineer performing root cause analysis on system logs.\n\
         Respond with a single JSON object and nothing else.\n\n",
    );
    prompt.push_str(&format!("Log file: {}\n", file.filename));
    prompt.push_str(&format!(
        "Errors: {}  Warnings: {}\n",
        file.error_count, file.warning_count
    ));
    prompt.push_str(&format!(
        "Chunk {} of {}\nTime range: {}\n\n",
        request.chunk, request.total_chunks, time_range
    ));
    prompt.push_str("Error entries:\n");
    prompt.push_str(&build_error_context(request.entries));
    prompt.push('\n');

    if let Some(context) = request.learning_context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("Historical context:\n");
        prompt.push_str(context);
        prompt.push('\n');
    }

    prompt.push_str(
        r#"Required JSON format:
{
  "summary": "2-3 sentence technical summary",
  "severity": "low|medium|high|critical",
  "rootCause": "primary root cause with evidence",
  "recommendations": ["specific action"],
  "errorAnalysis": [
    {
      "errorPattern": "short pattern name",
      "errorCount": 1,
      "firstOccurrence": "timestamp",
      "lastOccurrence": "timestamp",
      "severity": "critical|non-critical",
      "rootCause": "cause of this pattern",
      "impact": "what is affected",
      "fix": "how to fix it",
      "relatedErrors": ["related message"]
    }
  ],
  "criticalErrors": 0,
  "nonCriticalErrors": 0
}
"#,
    );
    prompt
}

// ============ Disabled ============

/// A client that fails every call.
pub struct DisabledClient;

#[async_trait]
impl AnalysisClient for DisabledClient {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn analyze(&self, _request: AnalysisRequest<'_>) -> RcaResult<AnalysisResult> {
        Err(RcaError::upstream("LLM provider is disabled"))
    }

    async fn embed(&self, _text: &str) -> RcaResult<Embedding> {
        Err(RcaError::upstream("LLM provider is disabled"))
    }

    async fn health_check(&self) -> RcaResult<()> {
        Err(RcaError::upstream("LLM provider is disabled"))
    }
}

// ============ Timeout wrapper ============

/// Bounds every call of the wrapped client by `timeout`. An elapsed call
/// is an `Upstream` failure.
pub struct TimedClient<C: ?Sized> {
    timeout: Duration,
    inner: Arc<C>,
}

impl<C: AnalysisClient + ?Sized> TimedClient<C> {
    pub fn new(inner: Arc<C>, timeout: Duration) -> Self {
        Self { timeout, inner }
    }

    async fn bounded<T>(
        &self,
        op: &str,
        fut: impl Future<Output = RcaResult<T>> + Send,
    ) -> RcaResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RcaError::upstream(format!(
                "{} {} timed out after {}s",
                self.inner.name(),
                op,
                self.timeout.as_secs_f64()
            ))),
        }
    }
}

#[async_trait]
impl<C: AnalysisClient + ?Sized> AnalysisClient for TimedClient<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn analyze(&self, request: AnalysisRequest<'_>) -> RcaResult<AnalysisResult> {
        self.bounded("analyze", self.inner.analyze(request)).await
    }

    async fn embed(&self, text: &str) -> RcaResult<Embedding> {
        self.bounded("embed", self.inner.embed(text)).await
    }

    async fn health_check(&self) -> RcaResult<()> {
        self.bounded("health check", self.inner.health_check()).await
    }
}

/// Create the configured [`AnalysisClient`], wrapped with the per-call timeout.
///
/// | Config Value | Client |
/// |-------------|--------|
/// | `"ollama"` | [`OllamaClient`] |
/// | `"disabled"` | [`DisabledClient`] |
pub fn create_client(config: &Config) -> Result<Arc<dyn AnalysisClient>> {
    let inner: Arc<dyn AnalysisClient> = match config.llm.provider.as_str() {
        "ollama" => Arc::new(OllamaClient::new(&config.llm)?),
        "disabled" => Arc::new(DisabledClient),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    };
    Ok(Arc::new(TimedClient::new(inner, config.jobs.call_timeout())))
}
