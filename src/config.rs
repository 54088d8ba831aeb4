use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use autolog_core::retrieval::RetrievalParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            call_timeout_secs: default_call_timeout_secs(),
            health_check: true,
        }
    }
}

impl JobsConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

fn default_chunk_size() -> usize {
    autolog_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_call_timeout_secs() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_pattern_threshold")]
    pub pattern_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            top_k: default_top_k(),
            pattern_threshold: default_pattern_threshold(),
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            similarity_threshold: self.similarity_threshold,
            top_k: self.top_k,
            pattern_threshold: self.pattern_threshold,
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_top_k() -> usize {
    5
}
fn default_pattern_threshold() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: default_url(),
            model: default_model(),
            embed_model: default_embed_model(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama2:13b".to_string()
}
fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    300
}
fn default_max_retries() -> u32 {
    2
}
fn default_temperature() -> f64 {
    0.2
}
fn default_top_p() -> f64 {
    0.8
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate jobs
    if config.jobs.chunk_size == 0 {
        anyhow::bail!("jobs.chunk_size must be > 0");
    }
    if config.jobs.call_timeout_secs == 0 {
        anyhow::bail!("jobs.call_timeout_secs must be > 0");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.retrieval.pattern_threshold) {
        anyhow::bail!("retrieval.pattern_threshold must be in [0.0, 1.0]");
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "disabled" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be ollama or disabled.",
            other
        ),
    }
    if config.llm.is_enabled() {
        if config.llm.url.trim().is_empty() {
            anyhow::bail!("llm.url must be set when provider is '{}'", config.llm.provider);
        }
        if config.llm.model.trim().is_empty() || config.llm.embed_model.trim().is_empty() {
            anyhow::bail!(
                "llm.model and llm.embed_model must be set when provider is '{}'",
                config.llm.provider
            );
        }
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }
    if !(0.0..=1.0).contains(&config.llm.top_p) {
        anyhow::bail!("llm.top_p must be in [0.0, 1.0]");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"./data/autolog.sqlite\"\n").unwrap();
        assert_eq!(config.jobs.chunk_size, 25);
        assert_eq!(config.jobs.call_timeout_secs, 300);
        assert!(config.jobs.health_check);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.similarity_threshold - 0.7).abs() < 1e-9);
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "llama2:13b");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn rejects_invalid_values() {
        let base = "[db]\npath = \"x.sqlite\"\n";
        assert!(parse_config(&format!("{base}[jobs]\nchunk_size = 0\n")).is_err());
        assert!(parse_config(&format!("{base}[retrieval]\ntop_k = 0\n")).is_err());
        assert!(parse_config(&format!("{base}[retrieval]\nsimilarity_threshold = 1.5\n")).is_err());
        assert!(parse_config(&format!("{base}[llm]\nprovider = \"openai\"\n")).is_err());
    }

    #[test]
    fn example_config_parses() {
        let config = parse_config(include_str!("../config/autolog.example.toml")).unwrap();
        assert_eq!(config.llm.embed_model, "nomic-embed-text");
        assert_eq!(config.retrieval.params().top_k, 5);
    }

    #[test]
    fn missing_db_section_fails() {
        assert!(parse_config("[jobs]\nchunk_size = 10\n").is_err());
    }
}
