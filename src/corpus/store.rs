use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A schema-description-plus-question text paired with its reference SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub answer: String,
}

impl Chunk {
    pub fn new(text: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            answer: answer.into(),
        }
    }
}

/// Ordered, read-only chunk collection. Position `i` belongs to vector `i` of the index.
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
}

impl ChunkStore {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    /// Decode a chunk file (JSON array of `{text, answer}`).
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let chunks: Vec<Chunk> = serde_json::from_slice(bytes)?;
        Ok(Self { chunks })
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.chunks)?)
    }

    pub fn write(&self, path: &Path) -> Result<Vec<u8>> {
        let bytes = self.to_json()?;
        std::fs::write(path, &bytes)?;
        Ok(bytes)
    }

    pub fn lookup(&self, index: usize) -> Result<&Chunk> {
        self.chunks.get(index).ok_or(AppError::IndexOutOfRange {
            index,
            len: self.chunks.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }
}
