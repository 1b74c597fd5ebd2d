//! In-memory [`VectorStore`] for tests and ephemeral runs.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`; search is
//! brute-force over all stored vectors.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::config::DistanceMetric;
use crate::error::RagResult;
use crate::models::{EmbeddingRecord, ScoredChunk};
use crate::vector::Embedding;

use super::{check_dims, check_k, rank, VectorStore};

pub struct InMemoryVectorStore {
    dims: usize,
    metric: DistanceMetric,
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl InMemoryVectorStore {
    pub fn new(dims: usize, metric: DistanceMetric) -> Self {
        Self {
            dims,
            metric,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of every stored record, in insertion order.
    pub fn records(&self) -> Vec<EmbeddingRecord> {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn dims(&self) -> usize {
        self.dims
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn insert_batch(&self, records: &[(String, Embedding)]) -> RagResult<usize> {
        // Validate everything first so a bad record leaves the store untouched.
        for (_, embedding) in records {
            check_dims(self.dims, embedding)?;
        }

        let mut stored = self
            .records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (text, embedding) in records {
            let id = stored.len() as i64 + 1;
            stored.push(EmbeddingRecord {
                id,
                text: text.clone(),
                embedding: embedding.clone(),
            });
        }
        Ok(records.len())
    }

    async fn nearest_scored(&self, query: &Embedding, k: usize) -> RagResult<Vec<ScoredChunk>> {
        check_k(k)?;
        check_dims(self.dims, query)?;

        let stored = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(rank(
            self.metric,
            query,
            stored
                .iter()
                .map(|r| (r.id, r.text.as_str(), r.embedding.as_slice())),
            k,
        ))
    }

    async fn count(&self) -> RagResult<usize> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len())
    }
}
