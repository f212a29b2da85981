use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::api::sync::{Api, ApiRepo};
use tokenizers::{Tokenizer, TruncationParams};

use crate::embed::{Embed, normalize_l2};
use crate::error::{AppError, Result};

const MAX_LEN: usize = 512;

// ─── HuggingFace download helper ─────────────────────────────────────────────

/// Resolve a model file to a local path.
///
/// `ApiRepo::get()` checks the HF cache first and only downloads when the file
/// is absent. The ureq fallback handles files the API cannot fetch.
fn hf_get(repo: &ApiRepo, repo_id: &str, filename: &str) -> anyhow::Result<std::path::PathBuf> {
    if let Ok(path) = repo.get(filename) {
        return Ok(path);
    }

    let url = format!("https://huggingface.co/{repo_id}/resolve/main/{filename}");
    let cache_dir = hf_hub::Cache::default().path().join("http-fallback");
    let dest = cache_dir.join(format!(
        "{}-{}",
        repo_id.replace('/', "-"),
        filename.replace('/', "_")
    ));

    if !dest.exists() {
        std::fs::create_dir_all(&cache_dir)?;
        let response = ureq::get(&url)
            .call()
            .with_context(|| format!("HTTP GET {url}"))?;
        let mut file = std::fs::File::create(&dest)?;
        std::io::copy(&mut response.into_reader(), &mut file)?;
    }
    Ok(dest)
}

/// Cap encodings at `MAX_LEN` tokens, special tokens included.
fn limit_length(tokenizer: &mut Tokenizer) -> anyhow::Result<()> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_LEN,
            ..Default::default()
        }))
        .map_err(|e| anyhow!("truncation setup failed: {e}"))?;
    Ok(())
}

// ─── Model ───────────────────────────────────────────────────────────────────

struct SentenceModel {
    bert: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl SentenceModel {
    fn load(model_id: &str) -> anyhow::Result<Self> {
        tracing::info!("Loading sentence embedder ({model_id})...");
        let device = Device::Cpu;
        let repo = Api::new()?.model(model_id.to_string());

        tracing::info!("  resolving config.json");
        let config_path = hf_get(&repo, model_id, "config.json").context("config.json")?;

        tracing::info!("  resolving tokenizer.json");
        let tokenizer_path =
            hf_get(&repo, model_id, "tokenizer.json").context("tokenizer.json")?;

        tracing::info!("  resolving model weights");
        let (weights_path, use_safetensors) = match hf_get(&repo, model_id, "model.safetensors") {
            Ok(p) => (p, true),
            Err(_) => (
                hf_get(&repo, model_id, "pytorch_model.bin").context("pytorch_model.bin")?,
                false,
            ),
        };

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| anyhow!("{e}"))?;
        limit_length(&mut tokenizer)?;

        tracing::info!("  loading model weights");
        let config: Config = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let vb = if use_safetensors {
            unsafe { VarBuilder::from_mmaped_safetensors(&[&weights_path], DTYPE, &device)? }
        } else {
            VarBuilder::from_pth(&weights_path, DTYPE, &device)?
        };
        let bert = BertModel::load(vb, &config)?;

        tracing::info!("  ready.");
        Ok(Self {
            bert,
            tokenizer,
            device,
        })
    }

    /// Mean-pooled, L2-normalised sentence vector. Blocking.
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("tokenize failed: {e}"))?;
        let ids: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let seq_len = ids.len();

        let input_ids = Tensor::from_vec(ids, (1, seq_len), &self.device)?;
        let token_type_ids = Tensor::zeros((1, seq_len), DType::I64, &self.device)?;
        let attention_mask = Tensor::ones((1, seq_len), DType::I64, &self.device)?;

        // (1, seq_len, hidden) -> (hidden,)
        let pooled = self
            .bert
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?
            .squeeze(0)?
            .mean(0)?;
        let mut v = pooled.to_vec1::<f32>()?;
        normalize_l2(&mut v);
        Ok(v)
    }
}

// ─── Public embedder ──────────────────────────────────────────────────────────

/// Sentence-transformers BERT model run in-process with Candle.
#[derive(Clone)]
pub struct LocalEmbedder {
    model: Arc<SentenceModel>,
}

impl LocalEmbedder {
    /// Load the model synchronously from the HuggingFace Hub cache.
    ///
    /// Call this from `tokio::task::spawn_blocking`; hf-hub's sync API may
    /// perform blocking I/O on first use.
    pub fn load(model_id: &str) -> Result<Self> {
        let model = SentenceModel::load(model_id).map_err(|e| AppError::Embed(format!("{e:#}")))?;
        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl Embed for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || model.embed(&text))
            .await
            .map_err(|e| AppError::Other(e.into()))?
            .map_err(|e| AppError::Embed(e.to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            texts
                .iter()
                .map(|t| model.embed(t))
                .collect::<anyhow::Result<Vec<_>>>()
        })
        .await
        .map_err(|e| AppError::Other(e.into()))?
        .map_err(|e| AppError::Embed(e.to_string()))
    }
}
