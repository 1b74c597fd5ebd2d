//! SQLite-backed [`VectorStore`].
//!
//! Records live in the `embeddings` table created by
//! [`migrate`](crate::migrate). The vector column holds the bracketed,
//! comma-separated literal form (`[0.12,-0.98,...]`), the same text form a
//! pgvector column accepts; encoding and decoding never leave this module.
//! Nearest-neighbour search scans every row and ranks in process.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::config::DistanceMetric;
use crate::error::{RagError, RagResult, StoreError};
use crate::models::ScoredChunk;
use crate::vector::Embedding;

use super::{check_dims, check_k, rank, VectorStore};

pub struct SqliteVectorStore {
    pool: SqlitePool,
    dims: usize,
    metric: DistanceMetric,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool, dims: usize, metric: DistanceMetric) -> Self {
        Self { pool, dims, metric }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn dims(&self) -> usize {
        self.dims
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn insert_batch(&self, records: &[(String, Embedding)]) -> RagResult<usize> {
        for (_, embedding) in records {
            check_dims(self.dims, embedding)?;
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for (text, embedding) in records {
            sqlx::query(
                "INSERT INTO embeddings (text, embedding, dims, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(text)
            .bind(to_literal(embedding))
            .bind(embedding.dims() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }

    async fn nearest_scored(&self, query: &Embedding, k: usize) -> RagResult<Vec<ScoredChunk>> {
        check_k(k)?;
        check_dims(self.dims, query)?;

        let rows = sqlx::query("SELECT id, text, embedding FROM embeddings")
            .fetch_all(&self.pool)
            .await?;

        let mut decoded = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.get("id");
            let text: String = row.get("text");
            let literal: String = row.get("embedding");
            let embedding = parse_literal(&literal)?;
            check_dims(self.dims, &embedding)?;
            decoded.push((id, text, embedding));
        }

        Ok(rank(
            self.metric,
            query,
            decoded
                .iter()
                .map(|(id, text, e)| (*id, text.as_str(), e.as_slice())),
            k,
        ))
    }

    async fn count(&self) -> RagResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

/// Encode a vector as `[v0,v1,...]`.
///
/// `f32`'s `Display` prints the shortest representation that parses back
/// to the same value, so the literal round-trips exactly.
fn to_literal(embedding: &Embedding) -> String {
    let parts: Vec<String> = embedding.as_slice().iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Decode the literal produced by [`to_literal`].
fn parse_literal(literal: &str) -> RagResult<Embedding> {
    let inner = literal
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| corrupt(format!("not a bracketed list: {:.40}", literal)))?;

    if inner.trim().is_empty() {
        return Ok(Embedding::new(Vec::new()));
    }

    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| corrupt(format!("bad component '{}': {}", part.trim(), e)))
        })
        .collect::<RagResult<Vec<f32>>>()
        .map(Embedding::new)
}

fn corrupt(message: String) -> RagError {
    RagError::Store(StoreError::Corrupt(message))
}
