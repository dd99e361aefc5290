//! Configuration parsing, environment overlay, and validation.
//!
//! The service is configured by a TOML file for structural settings (chunking
//! defaults, retrieval weights, server bind address) overlaid with the
//! environment variables documented as the operational contract (`STORE_URL`,
//! `EMBEDDING_MODEL`, `CHUNK_SIZE`, `CHUNK_OVERLAP`, `ANN_PROBES`,
//! `LLM_API_KEY`, `LLM_MODEL`, `VECTOR_WEIGHT`, `TEXT_WEIGHT`). Environment
//! variables always win over the file, and every field has a code default, so
//! an empty environment still produces a usable configuration. `Config` is
//! built once in `main` and passed explicitly into every component — no
//! component reads `std::env` itself.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Connection string for the persistent store. Required via `STORE_URL`
    /// in production; defaults to a local SQLite file so `cargo run` works
    /// without external services (see DESIGN.md open-question resolution).
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/aconex-rag.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_text_weight")]
    pub text_weight: f64,
    #[serde(default = "default_ann_probes")]
    pub ann_probes: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            text_weight: default_text_weight(),
            ann_probes: default_ann_probes(),
        }
    }
}

fn default_vector_weight() -> f64 {
    0.6
}
fn default_text_weight() -> f64 {
    0.4
}
fn default_ann_probes() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    /// Bearer credential for the `openai` provider. Flows through `Config`
    /// like every other secret (`EMBEDDING_API_KEY`) rather than read
    /// directly from the environment by the provider itself.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            api_key: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    48
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// LLM call parameters for the RAG orchestrator (C10). Absence of `api_key`
/// disables the LLM path; the orchestrator falls back to an extractive answer
/// (§6.3, §4.10 step 5).
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u32,
    #[serde(default = "default_upload_max_tokens")]
    pub upload_max_tokens: u32,
    #[serde(default = "default_llm_top_p")]
    pub top_p: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            temperature: default_llm_temperature(),
            chat_max_tokens: default_chat_max_tokens(),
            upload_max_tokens: default_upload_max_tokens(),
            top_p: default_llm_top_p(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

fn default_llm_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_llm_temperature() -> f32 {
    0.1
}
fn default_chat_max_tokens() -> u32 {
    1200
}
fn default_upload_max_tokens() -> u32 {
    800
}
fn default_llm_top_p() -> f32 {
    0.9
}
fn default_llm_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Project scope applied to uploads and ingested records that carry
    /// none of their own (§4.3's project_id resolution fallback).
    #[serde(default = "default_project_id")]
    pub default_project_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_project_id: default_project_id(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_project_id() -> String {
    "default".to_string()
}

/// Loads `Config` from an optional TOML file, then overlays the documented
/// environment variables, then validates. The file may be absent entirely —
/// in that case defaults plus environment variables drive the whole config.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("STORE_URL") {
        if !v.is_empty() {
            config.store.url = v;
        }
    }
    if let Ok(v) = std::env::var("EMBEDDING_MODEL") {
        if !v.is_empty() {
            config.embedding.model = Some(v);
        }
    }
    if let Ok(v) = std::env::var("EMBEDDING_API_KEY") {
        if !v.is_empty() {
            config.embedding.api_key = Some(v);
        }
    }
    if let Ok(v) = std::env::var("CHUNK_SIZE") {
        if let Ok(n) = v.parse() {
            config.chunking.chunk_size = n;
        }
    }
    if let Ok(v) = std::env::var("CHUNK_OVERLAP") {
        if let Ok(n) = v.parse() {
            config.chunking.chunk_overlap = n;
        }
    }
    if let Ok(v) = std::env::var("ANN_PROBES") {
        if let Ok(n) = v.parse() {
            config.retrieval.ann_probes = n;
        }
    }
    if let Ok(v) = std::env::var("LLM_API_KEY") {
        if !v.is_empty() {
            config.llm.api_key = Some(v);
        }
    }
    if let Ok(v) = std::env::var("LLM_MODEL") {
        if !v.is_empty() {
            config.llm.model = v;
        }
    }
    if let Ok(v) = std::env::var("VECTOR_WEIGHT") {
        if let Ok(n) = v.parse() {
            config.retrieval.vector_weight = n;
        }
    }
    if let Ok(v) = std::env::var("TEXT_WEIGHT") {
        if let Ok(n) = v.parse() {
            config.retrieval.text_weight = n;
        }
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.store.url.is_empty() {
        anyhow::bail!("store.url (STORE_URL) must not be empty");
    }

    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be strictly less than chunking.chunk_size");
    }
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    let weight_sum = config.retrieval.vector_weight + config.retrieval.text_weight;
    if (weight_sum - 1.0).abs() > 1e-6 {
        anyhow::bail!(
            "retrieval.vector_weight + retrieval.text_weight must sum to 1.0 (got {})",
            weight_sum
        );
    }
    if config.retrieval.ann_probes < 1 {
        anyhow::bail!("retrieval.ann_probes must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        match config.embedding.provider.as_str() {
            "openai" | "ollama" | "local" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }
    }

    Ok(())
}

/// Path to the SQLite file encoded in `store.url`, accepting either a bare
/// filesystem path or a `sqlite://` URL (mirrors the flexibility `sqlx`
/// itself affords, kept explicit here so `db::connect` never has to guess).
pub fn store_path(config: &Config) -> PathBuf {
    let url = &config.store.url;
    let stripped = url.strip_prefix("sqlite://").unwrap_or(url);
    PathBuf::from(stripped)
}
