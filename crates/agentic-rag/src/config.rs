//! Configuration for the RAG system

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::executor::RetryPolicy;
use crate::retrieval::{DistanceMetric, DEFAULT_MAX_K};
use crate::validation::{MAX_MAX_TOKENS, MAX_TEMPERATURE, MIN_MAX_TOKENS, MIN_TEMPERATURE};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "AGENTIC_RAG_CONFIG";

/// Main RAG system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// SQLite database locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Chat turn limits and defaults
    #[serde(default)]
    pub chat: ChatConfig,
    /// Vector retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Ollama embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    /// Retry policies for stores and generation
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

impl RagConfig {
    /// Load and validate a TOML config file. Missing sections take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: RagConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, else from `AGENTIC_RAG_CONFIG`, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(PathBuf::from(path)),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Reject settings that would make the server misbehave
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.chat.max_query_chars == 0 {
            problems.push("chat.max_query_chars must be positive".to_string());
        }
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&self.chat.default_temperature) {
            problems.push(format!(
                "chat.default_temperature must be between {} and {}",
                MIN_TEMPERATURE, MAX_TEMPERATURE
            ));
        }
        if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&self.chat.default_max_tokens) {
            problems.push(format!(
                "chat.default_max_tokens must be between {} and {}",
                MIN_MAX_TOKENS, MAX_MAX_TOKENS
            ));
        }
        if self.retrieval.max_k == 0 {
            problems.push("retrieval.max_k must be positive".to_string());
        }
        if self.retrieval.top_k == 0 || self.retrieval.top_k > self.retrieval.max_k {
            problems.push(format!(
                "retrieval.top_k must be between 1 and retrieval.max_k ({})",
                self.retrieval.max_k
            ));
        }
        if self.embeddings.dimensions == 0 {
            problems.push("embeddings.dimensions must be positive".to_string());
        }
        for (name, policy) in [
            ("resilience.store", &self.resilience.store),
            ("resilience.generation", &self.resilience.generation),
        ] {
            if policy.max_attempts == 0 {
                problems.push(format!("{}.max_attempts must be at least 1", name));
            }
            if policy.max_backoff_ms < policy.backoff_ms {
                problems.push(format!("{}.max_backoff_ms must be >= backoff_ms", name));
            }
            if policy.attempt_timeout_ms == Some(0) {
                problems.push(format!("{}.attempt_timeout_ms must be positive", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(problems.join("; ")))
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number
    #[serde(default = "default_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: true,
        }
    }
}

/// SQLite database locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Conversations, messages, and execution traces
    #[serde(default = "default_conversations_path")]
    pub conversations_path: PathBuf,
    /// Documents, chunks, and embeddings
    #[serde(default = "default_documents_path")]
    pub documents_path: PathBuf,
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentic-rag")
}

fn default_conversations_path() -> PathBuf {
    data_dir().join("conversations.db")
}

fn default_documents_path() -> PathBuf {
    data_dir().join("documents.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            conversations_path: default_conversations_path(),
            documents_path: default_documents_path(),
        }
    }
}

/// Chat turn limits and defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Longest accepted query in characters (default: 4000)
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    /// Temperature when the request leaves it out
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
    /// Token budget when the request leaves it out
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
}

fn default_max_query_chars() -> usize {
    4000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_query_chars: default_max_query_chars(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
        }
    }
}

/// Vector retrieval settings. The embedding model comes from `embeddings.model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Build a retriever at startup (requires a reachable Ollama)
    #[serde(default)]
    pub enabled: bool,
    /// Chunks retrieved per turn when the request does not say
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Largest `k` a search may ask for
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    /// Ranking metric
    #[serde(default)]
    pub metric: DistanceMetric,
}

fn default_top_k() -> usize {
    5
}

fn default_max_k() -> usize {
    DEFAULT_MAX_K
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_k: default_top_k(),
            max_k: default_max_k(),
            metric: DistanceMetric::Cosine,
        }
    }
}

/// Ollama embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Ollama base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Embedding model name
    #[serde(default = "default_embed_model")]
    pub model: String,
    /// Embedding dimensions (768 for nomic-embed-text)
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Request timeout in seconds
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_dimensions() -> usize {
    768
}

fn default_embed_timeout() -> u64 {
    30
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_embed_model(),
            dimensions: default_dimensions(),
            timeout_secs: default_embed_timeout(),
        }
    }
}

/// Retry policies for the two kinds of dependency calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Session resolution and trace writes
    #[serde(default = "RetryPolicyConfig::store")]
    pub store: RetryPolicyConfig,
    /// Generator calls
    #[serde(default = "RetryPolicyConfig::generation")]
    pub generation: RetryPolicyConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            store: RetryPolicyConfig::store(),
            generation: RetryPolicyConfig::generation(),
        }
    }
}

/// Serializable form of a [`RetryPolicy`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
    #[serde(default)]
    pub exponential: bool,
    #[serde(default)]
    pub attempt_timeout_ms: Option<u64>,
}

impl RetryPolicyConfig {
    fn store() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 50,
            max_backoff_ms: 1_000,
            exponential: true,
            attempt_timeout_ms: Some(5_000),
        }
    }

    fn generation() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 200,
            max_backoff_ms: 2_000,
            exponential: true,
            attempt_timeout_ms: Some(30_000),
        }
    }

    /// Build the runtime policy
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        let policy = RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms))?
            .with_max_backoff(Duration::from_millis(self.max_backoff_ms))
            .with_exponential(self.exponential);
        Ok(match self.attempt_timeout_ms {
            Some(ms) => policy.with_attempt_timeout(Duration::from_millis(ms)),
            None => policy,
        })
    }
}
