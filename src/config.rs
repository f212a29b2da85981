use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub embed: EmbedConfig,
    pub llm: LlmConfig,
    pub corpus: CorpusConfig,
    pub retrieval: RetrievalConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// HuggingFace model ID of a BERT-family sentence-transformers model.
    /// Must be the same model the corpus was built with.
    pub model_id: String,
    /// Upper bound for a single query embedding.
    pub timeout_secs: u64,
    /// Texts per batch during `build`.
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    /// Base URL of the Generative Language REST API
    pub base_url: String,
    /// Falls back to GEMINI_API_KEY when unset
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Vector index file name inside <dir>/.sqlrag
    pub index_file: String,
    /// Chunk file name inside <dir>/.sqlrag
    pub chunks_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub default_k: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Budget for schema text across all contexts in one prompt
    pub max_context_chars: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            embed: EmbedConfig {
                model_id: "sentence-transformers/all-MiniLM-L6-v2".into(),
                timeout_secs: 30,
                batch_size: 64,
            },
            llm: LlmConfig {
                model: "gemini-2.5-flash".into(),
                base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
                api_key: None,
                temperature: 0.2,
                timeout_secs: 30,
            },
            corpus: CorpusConfig {
                index_file: "embeddings.idx".into(),
                chunks_file: "chunks.json".into(),
            },
            retrieval: RetrievalConfig { default_k: 3 },
            prompt: PromptConfig {
                max_context_chars: 3000,
            },
        }
    }
}

impl AppConfig {
    /// The API key, or `MissingApiKey` when generation is impossible.
    pub fn require_api_key(&self) -> Result<&str> {
        self.llm
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AppError::MissingApiKey)
    }

    /// Copy safe to print: the API key is masked.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.llm.api_key.is_some() {
            cfg.llm.api_key = Some("***".into());
        }
        cfg
    }
}

impl EmbedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Returns the default global config path: ~/.sqlrag/sqlrag.toml
pub fn global_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sqlrag")
        .join("sqlrag.toml")
}

/// Returns the corpus directory for a given target directory: <target_dir>/.sqlrag
pub fn corpus_dir(target_dir: &Path) -> PathBuf {
    target_dir.join(".sqlrag")
}

/// Ensures the global config file exists, creating it with defaults on first launch.
/// Does nothing if the file already exists.
pub fn ensure_global_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_GLOBAL_CONFIG)?;
    Ok(())
}

const DEFAULT_GLOBAL_CONFIG: &str = r#"# sqlrag global configuration
# This file was created automatically. Edit as needed.
# Project-level overrides go in sqlrag.toml in the project directory.

[embed]
model_id = "sentence-transformers/all-MiniLM-L6-v2"   # downloaded from HuggingFace Hub on first run
timeout_secs = 30
batch_size = 64

[llm]
model = "gemini-2.5-flash"
base_url = "https://generativelanguage.googleapis.com/v1beta"
# api_key is read from GEMINI_API_KEY; avoid committing it here
temperature = 0.2
timeout_secs = 30

[corpus]
index_file = "embeddings.idx"
chunks_file = "chunks.json"

[retrieval]
default_k = 3

[prompt]
max_context_chars = 3000
"#;

/// Load configuration using figment's layered system:
/// 1. Built-in Rust defaults (AppConfig::default)
/// 2. Global config file (~/.sqlrag/sqlrag.toml), silently ignored if missing
/// 3. Project config file (<target-dir>/sqlrag.toml), only merged if Some
/// 4. Environment variables prefixed with SQLRAG_ (nested with __)
///    e.g. SQLRAG_LLM__MODEL=gemini-2.5-pro
/// 5. GEMINI_API_KEY, mapped onto llm.api_key
pub fn load(global_config: &Path, project_config: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(global_config));

    if let Some(proj) = project_config {
        figment = figment.merge(Toml::file(proj));
    }

    let config = figment
        .merge(Env::prefixed("SQLRAG_").split("__"))
        .merge(
            Env::raw()
                .only(&["GEMINI_API_KEY"])
                .map(|_| "llm.api_key".into()),
        )
        .extract()?;

    Ok(config)
}
