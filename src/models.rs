//! Core data types that flow through ingestion, retrieval and answering.

use serde::Serialize;

use crate::vector::Embedding;

/// A window of source text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the window within its source text.
    pub index: usize,
    pub text: String,
}

/// A persisted `(text, embedding)` pair.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: i64,
    pub text: String,
    pub embedding: Embedding,
}

/// A stored chunk together with its distance to a query vector.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub text: String,
    pub distance: f32,
}

/// A registered account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub roles: Vec<String>,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn has_any_role(&self, required: &[&str]) -> bool {
        self.roles.iter().any(|r| required.contains(&r.as_str()))
    }
}

/// Outcome of a question: the model's reply and the context it was given.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub context_used: Vec<String>,
}
