use std::cmp::Ordering;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const FORMAT_VERSION: u32 = 1;

/// On-disk layout of the vector index.
///
/// `vectors` is the row-major `count * dimension` array; row `i` is the
/// embedding of chunk `i`. `chunks_digest` is the SHA-256 hex of the chunk
/// file the vectors were built alongside.
#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    dimension: usize,
    count: usize,
    chunks_digest: String,
    vectors: Vec<f32>,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub source_index: usize,
    pub score: f32,
}

/// Flat inner-product index over L2-normalized vectors.
#[derive(Debug)]
pub struct EmbeddingIndex {
    dimension: usize,
    vectors: Vec<f32>,
    chunks_digest: String,
}

impl EmbeddingIndex {
    pub fn new(dimension: usize, rows: Vec<Vec<f32>>, chunks_digest: String) -> Result<Self> {
        let mut vectors = Vec::with_capacity(rows.len() * dimension);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dimension {
                return Err(AppError::CorpusInconsistency(format!(
                    "vector {i} has {} dims, expected {dimension}",
                    row.len()
                )));
            }
            vectors.extend(row);
        }
        Ok(Self {
            dimension,
            vectors,
            chunks_digest,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let reader = BufReader::new(std::fs::File::open(path)?);
        let file: IndexFile = bincode::deserialize_from(reader)?;

        if file.version != FORMAT_VERSION {
            return Err(AppError::CorpusInconsistency(format!(
                "unsupported index format version {} (expected {FORMAT_VERSION}); rebuild the corpus",
                file.version
            )));
        }
        let expected = file.count.checked_mul(file.dimension).ok_or_else(|| {
            AppError::CorpusInconsistency(format!(
                "index header {} x {} overflows",
                file.count, file.dimension
            ))
        })?;
        if file.vectors.len() != expected {
            return Err(AppError::CorpusInconsistency(format!(
                "index holds {} floats, header says {} x {}",
                file.vectors.len(),
                file.count,
                file.dimension
            )));
        }

        Ok(Self {
            dimension: file.dimension,
            vectors: file.vectors,
            chunks_digest: file.chunks_digest,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = IndexFile {
            version: FORMAT_VERSION,
            dimension: self.dimension,
            count: self.len(),
            chunks_digest: self.chunks_digest.clone(),
            vectors: self.vectors.clone(),
        };
        let writer = BufWriter::new(std::fs::File::create(path)?);
        bincode::serialize_into(writer, &file)?;
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.vectors.len() / self.dimension
        }
    }

    pub fn chunks_digest(&self) -> &str {
        &self.chunks_digest
    }

    /// Top `min(k, len)` rows by inner product with `query`, best first.
    /// Equal scores are ordered by ascending source index.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        if query.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Hit> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(source_index, row)| Hit {
                source_index,
                score: dot(row, query),
            })
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank_order);
            hits.truncate(k);
        }
        hits.sort_by(rank_order);
        Ok(hits)
    }
}

fn rank_order(a: &Hit, b: &Hit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.source_index.cmp(&b.source_index))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_raw(path: &Path, file: &IndexFile) {
        let writer = BufWriter::new(std::fs::File::create(path).unwrap());
        bincode::serialize_into(writer, file).unwrap();
    }

    #[test]
    fn overflowing_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.idx");
        write_raw(
            &path,
            &IndexFile {
                version: FORMAT_VERSION,
                dimension: usize::MAX,
                count: 2,
                chunks_digest: String::new(),
                vectors: vec![1.0, 0.0],
            },
        );
        assert!(matches!(
            EmbeddingIndex::read(&path),
            Err(AppError::CorpusInconsistency(_))
        ));
    }

    fn index(rows: Vec<Vec<f32>>) -> EmbeddingIndex {
        let dim = rows.first().map_or(0, Vec::len);
        EmbeddingIndex::new(dim, rows, String::new()).unwrap()
    }

    #[test]
    fn search_ranks_by_descending_score() {
        let idx = index(vec![
            vec![1.0, 0.0],
            vec![0.6, 0.8],
            vec![0.0, 1.0],
        ]);
        let hits = idx.search(&[0.0, 1.0], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.source_index).collect();
        assert_eq!(order, vec![2, 1, 0]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn ties_break_by_ascending_source_index() {
        let idx = index(vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
        ]);
        let hits = idx.search(&[1.0, 0.0], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.source_index).collect();
        assert_eq!(order, vec![1, 3, 0]);
    }

    #[test]
    fn k_is_clamped_to_corpus_size() {
        let idx = index(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(idx.search(&[1.0, 0.0], 10).unwrap().len(), 2);
        assert!(idx.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn wrong_query_dimension_is_rejected() {
        let idx = index(vec![vec![1.0, 0.0]]);
        match idx.search(&[1.0, 0.0, 0.0], 1) {
            Err(AppError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = EmbeddingIndex::new(2, vec![vec![1.0, 0.0], vec![1.0]], String::new());
        assert!(matches!(err, Err(AppError::CorpusInconsistency(_))));
    }

    #[test]
    fn survives_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.idx");
        let idx = EmbeddingIndex::new(2, vec![vec![1.0, 0.0], vec![0.0, 1.0]], "abc".into()).unwrap();
        idx.write(&path).unwrap();

        let loaded = EmbeddingIndex::read(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dimension(), 2);
        assert_eq!(loaded.chunks_digest(), "abc");
        assert_eq!(loaded.search(&[0.0, 1.0], 1).unwrap()[0].source_index, 1);
    }
}
