use std::path::Path;

use serde_json::Value;

use crate::config::EmbedConfig;
use crate::corpus::index::EmbeddingIndex;
use crate::corpus::store::{Chunk, ChunkStore};
use crate::corpus::{CorpusPaths, compute_hash};
use crate::embed::{Embed, normalize_l2};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub records: usize,
    pub chunks: usize,
    pub dimension: usize,
}

/// Build a fresh corpus generation from a JSON array of
/// `{question, context, answer}` records and write it to `paths`.
pub async fn run(
    records_path: &Path,
    paths: &CorpusPaths,
    embed_cfg: &EmbedConfig,
    embedder: &dyn Embed,
) -> Result<BuildStats> {
    let raw: Value = serde_json::from_slice(&std::fs::read(records_path)?)?;
    let records = match raw {
        Value::Array(items) => items,
        _ => {
            return Err(AppError::Other(anyhow::anyhow!(
                "{} must contain a JSON array of records",
                records_path.display()
            )));
        }
    };
    let total = records.len();

    let chunks = create_chunks(&records);
    tracing::info!("{} usable records out of {total}", chunks.len());
    if chunks.is_empty() {
        return Err(AppError::Other(anyhow::anyhow!(
            "no record in {} has question, context and answer",
            records_path.display()
        )));
    }

    let batch_size = embed_cfg.batch_size.max(1);
    let mut rows = Vec::with_capacity(chunks.len());
    for (n, batch) in chunks.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let mut vectors = embedder.embed_batch(&texts).await?;
        for v in &mut vectors {
            normalize_l2(v);
        }
        rows.extend(vectors);
        tracing::info!("embedded batch {} ({}/{} chunks)", n + 1, rows.len(), chunks.len());
    }

    let dimension = rows.first().map_or(0, Vec::len);
    let chunk_count = chunks.len();

    if let Some(parent) = paths.chunks.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let chunk_bytes = ChunkStore::new(chunks).write(&paths.chunks)?;
    let index = EmbeddingIndex::new(dimension, rows, compute_hash(&chunk_bytes))?;
    if let Some(parent) = paths.index.parent() {
        std::fs::create_dir_all(parent)?;
    }
    index.write(&paths.index)?;

    Ok(BuildStats {
        records: total,
        chunks: chunk_count,
        dimension,
    })
}

/// Keep objects carrying `question`, `context` and `answer`, and turn each
/// into a chunk whose text is the context followed by the question.
pub fn create_chunks(records: &[Value]) -> Vec<Chunk> {
    records
        .iter()
        .filter_map(|entry| {
            let obj = entry.as_object()?;
            let question = field_text(obj.get("question")?);
            let context = field_text(obj.get("context")?);
            let answer = match obj.get("answer")? {
                Value::Null => String::new(),
                other => field_text(other),
            };
            Some(Chunk::new(
                format!("Context: {context}\nQuestion: {question}"),
                answer,
            ))
        })
        .collect()
}

/// Strings are trimmed. `null` renders as `None`, matching how the source
/// datasets were prepared; other values render as JSON text.
fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}
