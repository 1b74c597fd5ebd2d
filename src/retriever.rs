//! Ingestion and top-k retrieval.
//!
//! Ingestion runs chunk → embed → store. The whole input is embedded before
//! anything is written, and the write is one batch, so an embedding failure
//! leaves the store exactly as it was.

use std::sync::Arc;

use crate::chunk::Chunker;
use crate::embedding::Embedder;
use crate::error::{EmbeddingServiceError, InputConstraintViolation, RagResult};
use crate::store::VectorStore;

pub struct Retriever {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            chunker,
            embedder,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Chunk, embed and persist `raw_text`. Returns the number of chunks written.
    pub async fn ingest(&self, raw_text: &str) -> RagResult<usize> {
        if raw_text.trim().is_empty() {
            return Err(InputConstraintViolation::new("text must not be empty").into());
        }

        let texts: Vec<String> = self
            .chunker
            .split(raw_text)
            .into_iter()
            .map(|c| c.text)
            .collect();

        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingServiceError::Malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ))
            .into());
        }
        tracing::debug!(
            chunks = texts.len(),
            model = self.embedder.model_name(),
            "embedded chunks"
        );

        let records: Vec<_> = texts.into_iter().zip(vectors).collect();
        let written = self.store.insert_batch(&records).await?;

        tracing::info!(chunks = written, "ingested text");
        Ok(written)
    }

    /// The `k` stored chunks closest to `question`, most relevant first.
    pub async fn retrieve_top_k(&self, question: &str, k: usize) -> RagResult<Vec<String>> {
        if question.trim().is_empty() {
            return Err(InputConstraintViolation::new("question must not be empty").into());
        }
        if k == 0 {
            return Err(InputConstraintViolation::new("k must be > 0").into());
        }

        let query = self.embedder.embed_one(question).await?;
        let hits = self.store.nearest_scored(&query, k).await?;

        tracing::debug!(
            k,
            hits = hits.len(),
            best = hits.first().map(|h| h.distance),
            "retrieved context"
        );
        Ok(hits.into_iter().map(|h| h.text).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistanceMetric;
    use crate::error::{EmbeddingServiceError, RagError};
    use crate::store::InMemoryVectorStore;
    use crate::vector::Embedding;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps text to `[len, count of 'a']`; fails after `fail_after` calls.
    struct FakeEmbedder {
        calls: AtomicUsize,
        fail_after: usize,
        short_batch: bool,
    }

    impl FakeEmbedder {
        fn new() -> Self {
            Self::failing_after(usize::MAX)
        }
        fn failing_after(n: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_after: n,
                short_batch: false,
            }
        }
        /// Returns one vector fewer than it was given texts.
        fn short_batch() -> Self {
            Self {
                short_batch: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<Embedding>, EmbeddingServiceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
                return Err(EmbeddingServiceError::Transport("connection refused".into()));
            }
            let keep = if self.short_batch {
                texts.len().saturating_sub(1)
            } else {
                texts.len()
            };
            Ok(texts
                .iter()
                .take(keep)
                .map(|t| {
                    let a = t.chars().filter(|c| *c == 'a').count() as f32;
                    Embedding::new(vec![t.chars().count() as f32, a])
                })
                .collect())
        }
    }

    fn retriever(embedder: FakeEmbedder) -> (Retriever, Arc<InMemoryVectorStore>) {
        let store = Arc::new(InMemoryVectorStore::new(2, DistanceMetric::Euclidean));
        let r = Retriever::new(Chunker::new(10, 2).unwrap(), Arc::new(embedder), store.clone());
        (r, store)
    }

    #[tokio::test]
    async fn test_ingest_preserves_chunk_order() {
        let (r, store) = retriever(FakeEmbedder::new());
        let text = "aaaaaaaaaabbbbbbbbbbcccc";
        let n = r.ingest(text).await.unwrap();

        let records = store.records();
        assert_eq!(records.len(), n);
        let expected = Chunker::new(10, 2).unwrap().split(text);
        for (record, chunk) in records.iter().zip(expected.iter()) {
            assert_eq!(record.text, chunk.text);
            let a = chunk.text.chars().filter(|c| *c == 'a').count() as f32;
            assert_eq!(record.embedding.as_slice()[1], a);
        }
    }

    #[tokio::test]
    async fn test_failed_embedding_writes_nothing() {
        let (r, store) = retriever(FakeEmbedder::failing_after(0));
        let err = r.ingest("some text to index").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_short_embedding_batch_writes_nothing() {
        let (r, store) = retriever(FakeEmbedder::short_batch());
        let err = r.ingest("aaaaaaaaaabbbbbbbbbbcccccccccc").await.unwrap_err();
        assert!(matches!(
            err,
            RagError::Embedding(EmbeddingServiceError::Malformed(_))
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_embedding() {
        let (r, _) = retriever(FakeEmbedder::failing_after(0));
        let err = r.ingest("   ").await.unwrap_err();
        assert!(matches!(err, RagError::InputConstraint(_)));
    }

    #[tokio::test]
    async fn test_retrieve_on_empty_store() {
        let (r, _) = retriever(FakeEmbedder::new());
        assert!(r.retrieve_top_k("anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_zero_k_rejected() {
        let (r, _) = retriever(FakeEmbedder::new());
        let err = r.retrieve_top_k("anything", 0).await.unwrap_err();
        assert!(matches!(err, RagError::InputConstraint(_)));
    }

    #[tokio::test]
    async fn test_retrieve_most_similar_first() {
        let (r, _) = retriever(FakeEmbedder::new());
        r.ingest("aaaaaaaa").await.unwrap();
        r.ingest("bbbb").await.unwrap();

        let hits = r.retrieve_top_k("cccc", 5).await.unwrap();
        assert_eq!(hits.first().map(String::as_str), Some("bbbb"));
        assert_eq!(hits.len(), 2);
    }
}
