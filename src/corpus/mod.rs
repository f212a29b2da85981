pub mod builder;
pub mod index;
pub mod store;

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::CorpusConfig;
use crate::error::{AppError, Result};
use index::{EmbeddingIndex, Hit};
use store::{Chunk, ChunkStore};

/// Locations of the two files that make up one corpus generation.
#[derive(Debug, Clone)]
pub struct CorpusPaths {
    pub index: PathBuf,
    pub chunks: PathBuf,
}

impl CorpusPaths {
    pub fn new(corpus_dir: &Path, cfg: &CorpusConfig) -> Self {
        Self {
            index: corpus_dir.join(&cfg.index_file),
            chunks: corpus_dir.join(&cfg.chunks_file),
        }
    }
}

/// Embedding index and chunk store of the same corpus generation.
/// Immutable after load; share it behind an `Arc`.
#[derive(Debug)]
pub struct Corpus {
    index: EmbeddingIndex,
    store: ChunkStore,
}

impl Corpus {
    /// Pair an index with its store, rejecting mismatched element counts.
    pub fn new(index: EmbeddingIndex, store: ChunkStore) -> Result<Self> {
        if index.len() != store.len() {
            return Err(AppError::CorpusInconsistency(format!(
                "index holds {} vectors but chunk store holds {} chunks",
                index.len(),
                store.len()
            )));
        }
        Ok(Self { index, store })
    }

    pub fn load(paths: &CorpusPaths) -> Result<Self> {
        for path in [&paths.index, &paths.chunks] {
            if !path.exists() {
                return Err(AppError::CorpusMissing(path.clone()));
            }
        }

        let chunk_bytes = std::fs::read(&paths.chunks)?;
        let index = EmbeddingIndex::read(&paths.index)?;

        let digest = compute_hash(&chunk_bytes);
        if index.chunks_digest() != digest {
            return Err(AppError::CorpusInconsistency(format!(
                "{} was not built together with {}",
                paths.index.display(),
                paths.chunks.display()
            )));
        }

        let store = ChunkStore::from_json(&chunk_bytes)?;
        let corpus = Self::new(index, store)?;
        tracing::info!(
            "loaded corpus: {} chunks, {} dims",
            corpus.len(),
            corpus.dimension()
        );
        Ok(corpus)
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        self.index.search(query, k)
    }

    pub fn lookup(&self, source_index: usize) -> Result<&Chunk> {
        self.store.lookup(source_index)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }
}

pub(crate) fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_generation(dir: &Path, chunks: Vec<Chunk>, rows: Vec<Vec<f32>>) -> CorpusPaths {
        let paths = CorpusPaths::new(dir, &crate::config::AppConfig::default().corpus);
        let bytes = ChunkStore::new(chunks).write(&paths.chunks).unwrap();
        EmbeddingIndex::new(2, rows, compute_hash(&bytes))
            .unwrap()
            .write(&paths.index)
            .unwrap();
        paths
    }

    #[test]
    fn loads_matching_generation() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_generation(
            dir.path(),
            vec![Chunk::new("a", "SELECT a FROM t"), Chunk::new("b", "SELECT b FROM t")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        );
        let corpus = Corpus::load(&paths).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.dimension(), 2);
        assert_eq!(corpus.lookup(1).unwrap().text, "b");
    }

    #[test]
    fn missing_file_is_reported_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CorpusPaths::new(dir.path(), &crate::config::AppConfig::default().corpus);
        match Corpus::load(&paths) {
            Err(AppError::CorpusMissing(p)) => assert_eq!(p, paths.index),
            other => panic!("expected CorpusMissing, got {other:?}"),
        }
    }

    #[test]
    fn chunk_file_from_another_build_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_generation(
            dir.path(),
            vec![Chunk::new("a", "SELECT a FROM t")],
            vec![vec![1.0, 0.0]],
        );
        ChunkStore::new(vec![Chunk::new("z", "SELECT z FROM t")])
            .write(&paths.chunks)
            .unwrap();
        assert!(matches!(
            Corpus::load(&paths),
            Err(AppError::CorpusInconsistency(_))
        ));
    }

    #[test]
    fn count_mismatch_is_rejected_eagerly() {
        let index = EmbeddingIndex::new(2, vec![vec![1.0, 0.0]], String::new()).unwrap();
        let store = ChunkStore::new(vec![Chunk::new("a", "x"), Chunk::new("b", "y")]);
        assert!(matches!(
            Corpus::new(index, store),
            Err(AppError::CorpusInconsistency(_))
        ));
    }
}
