pub mod fence;
pub mod generator;
pub mod pipeline;
pub mod prompt;
pub mod retriever;

use std::path::Path;
use std::sync::Arc;

use crate::config::{self, AppConfig};
use crate::corpus::{Corpus, CorpusPaths};
use crate::embed::Embed;
use crate::embed::local::LocalEmbedder;
use crate::error::{AppError, Result};
use crate::llm::gemini::GeminiClient;
use generator::Generator;
use pipeline::Pipeline;
use retriever::Retriever;

/// Load the sentence embedder off the async runtime.
pub async fn load_embedder(cfg: &AppConfig) -> Result<Arc<dyn Embed>> {
    let model_id = cfg.embed.model_id.clone();
    let embedder = tokio::task::spawn_blocking(move || LocalEmbedder::load(&model_id))
        .await
        .map_err(|e| AppError::Other(e.into()))??;
    Ok(Arc::new(embedder))
}

pub fn corpus_paths(cfg: &AppConfig, target_dir: &Path) -> CorpusPaths {
    CorpusPaths::new(&config::corpus_dir(target_dir), &cfg.corpus)
}

/// Corpus plus query embedder: everything retrieval-only mode needs.
pub async fn build_retriever(cfg: &AppConfig, target_dir: &Path) -> Result<Retriever> {
    let corpus = Arc::new(Corpus::load(&corpus_paths(cfg, target_dir))?);
    let embedder = load_embedder(cfg).await?;
    Ok(Retriever::new(corpus, embedder, cfg.embed.timeout()))
}

/// Full pipeline. The API key is checked before any model or corpus is loaded.
pub async fn build_pipeline(cfg: &AppConfig, target_dir: &Path) -> Result<Pipeline> {
    let api_key = cfg.require_api_key()?;
    let llm = Arc::new(GeminiClient::new(&cfg.llm, api_key)?);
    let retriever = build_retriever(cfg, target_dir).await?;
    Ok(Pipeline::new(retriever, Generator::from_config(llm, cfg)))
}
