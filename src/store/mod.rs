//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait is the only persistence surface the retrieval
//! pipeline sees. Vectors cross it as typed [`Embedding`]s; how they are
//! encoded on disk is private to each backend.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteVectorStore`] | Production: the `embeddings` table, brute-force scan |
//! | [`InMemoryVectorStore`] | Tests and ephemeral runs |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::config::DistanceMetric;
use crate::error::{InputConstraintViolation, RagError, RagResult, StoreError};
use crate::models::ScoredChunk;
use crate::vector::Embedding;

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// Append-only store of `(text, embedding)` records with nearest-neighbour lookup.
///
/// Every record must have the store's configured dimension; a mismatch on
/// insert or query is reported as [`StoreError::DimensionMismatch`].
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Vector dimension every record must have.
    fn dims(&self) -> usize;

    /// Metric used for both ranking and reported distances.
    fn metric(&self) -> DistanceMetric;

    /// Persist a single record.
    async fn insert(&self, text: &str, embedding: &Embedding) -> RagResult<()> {
        self.insert_batch(&[(text.to_string(), embedding.clone())])
            .await
            .map(|_| ())
    }

    /// Persist all records atomically, in order. Returns the number written.
    async fn insert_batch(&self, records: &[(String, Embedding)]) -> RagResult<usize>;

    /// Up to `k` closest records, closest first, with their distances.
    async fn nearest_scored(&self, query: &Embedding, k: usize) -> RagResult<Vec<ScoredChunk>>;

    /// Up to `k` closest texts, closest first.
    ///
    /// `k == 0` is rejected; a `k` larger than the store returns every
    /// record; an empty store returns an empty list.
    async fn nearest(&self, query: &Embedding, k: usize) -> RagResult<Vec<String>> {
        Ok(self
            .nearest_scored(query, k)
            .await?
            .into_iter()
            .map(|c| c.text)
            .collect())
    }

    /// Number of stored records.
    async fn count(&self) -> RagResult<usize>;
}

pub(crate) fn check_k(k: usize) -> RagResult<()> {
    if k == 0 {
        return Err(InputConstraintViolation::new("k must be > 0").into());
    }
    Ok(())
}

pub(crate) fn check_dims(expected: usize, embedding: &Embedding) -> RagResult<()> {
    if embedding.dims() != expected {
        return Err(RagError::Store(StoreError::DimensionMismatch {
            expected,
            actual: embedding.dims(),
        }));
    }
    Ok(())
}

/// Rank `(id, text, vector)` rows against `query` and keep the `k` closest.
///
/// Ties are broken by insertion id so results are stable.
pub(crate) fn rank<'a, I>(
    metric: DistanceMetric,
    query: &Embedding,
    rows: I,
    k: usize,
) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = (i64, &'a str, &'a [f32])>,
{
    let mut scored: Vec<(f32, i64, &str)> = rows
        .into_iter()
        .map(|(id, text, vec)| (metric.distance(query.as_slice(), vec), id, text))
        .collect();

    // NaN distances rank last whatever their sign bit.
    scored.sort_by(|a, b| {
        a.0.is_nan()
            .cmp(&b.0.is_nan())
            .then(a.0.total_cmp(&b.0))
            .then(a.1.cmp(&b.1))
    });
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(distance, _, text)| ScoredChunk {
            text: text.to_string(),
            distance,
        })
        .collect()
}
