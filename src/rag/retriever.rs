use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::corpus::Corpus;
use crate::corpus::store::Chunk;
use crate::embed::{Embed, normalize_l2};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    /// 1-based position in the ranking
    pub rank: usize,
    /// Ordinal of the chunk in the corpus
    pub source_index: usize,
    /// Cosine similarity
    pub score: f32,
    pub chunk: Chunk,
}

pub struct Retriever {
    corpus: Arc<Corpus>,
    embedder: Arc<dyn Embed>,
    embed_timeout: Duration,
}

impl Retriever {
    pub fn new(corpus: Arc<Corpus>, embedder: Arc<dyn Embed>, embed_timeout: Duration) -> Self {
        Self {
            corpus,
            embedder,
            embed_timeout,
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Top `k` chunks for `query`, best first. `k <= 0` gives an empty list,
    /// `k` beyond the corpus size gives the whole corpus.
    pub async fn retrieve(&self, query: &str, k: i64) -> Result<Vec<RetrievalResult>> {
        let k = clamp_k(k, self.corpus.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut vector = tokio::time::timeout(self.embed_timeout, self.embedder.embed(query))
            .await
            .map_err(|_| AppError::EmbedTimeout(self.embed_timeout))??;
        normalize_l2(&mut vector);

        let hits = self.corpus.search(&vector, k)?;
        tracing::debug!("retrieved {} of {} chunks", hits.len(), self.corpus.len());

        hits.into_iter()
            .enumerate()
            .map(|(i, hit)| {
                Ok(RetrievalResult {
                    rank: i + 1,
                    source_index: hit.source_index,
                    score: hit.score,
                    chunk: self.corpus.lookup(hit.source_index)?.clone(),
                })
            })
            .collect()
    }
}

fn clamp_k(k: i64, corpus_len: usize) -> usize {
    if k <= 0 {
        0
    } else {
        usize::try_from(k).map_or(corpus_len, |k| k.min(corpus_len))
    }
}

pub async fn retrieve_cmd(
    retriever: &Retriever,
    query: &str,
    k: i64,
    format: OutputFormat,
) -> Result<()> {
    let results = retriever.retrieve(query, k).await?;
    match format {
        OutputFormat::Text => print_results(query, &results),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
    }
    Ok(())
}

pub fn print_results(query: &str, results: &[RetrievalResult]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }
    println!("\nQuery: {query}\n");
    for r in results {
        println!("Rank {} | score={:.4}", r.rank, r.score);
        println!("Schema: {}", r.chunk.text);
        println!("SQL: {}\n", r.chunk.answer);
    }
}
