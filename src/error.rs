//! Typed failures of the retrieval pipeline and the auth gate.
//!
//! Each external collaborator (embedding provider, vector store, language
//! model) has its own error type so callers can tell them apart; none of
//! them is ever swallowed or retried inside the core.

use thiserror::Error;

/// Rejected input, raised before any external call is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid input: {0}")]
pub struct InputConstraintViolation(pub String);

impl InputConstraintViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum EmbeddingServiceError {
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("embedding provider request failed: {0}")]
    Transport(String),
    #[error("embedding provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vector store query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("embedding dimension mismatch: store expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("corrupt vector in store: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum GenerationServiceError {
    #[error("language model is disabled")]
    Disabled,
    #[error("language model request failed: {0}")]
    Transport(String),
    #[error("language model returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed language model response: {0}")]
    Malformed(String),
}

/// Any failure of ingestion, retrieval or answering.
#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    InputConstraint(#[from] InputConstraintViolation),
    #[error(transparent)]
    Embedding(#[from] EmbeddingServiceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Generation(#[from] GenerationServiceError),
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::Store(StoreError::Database(err))
    }
}

pub type RagResult<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or invalid session, or the caller holds none of the
    /// required roles.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("passwords are not the same")]
    PasswordMismatch,
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("user already exists: {0}")]
    UserExists(String),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error(transparent)]
    InputConstraint(#[from] InputConstraintViolation),
    #[error("user store failure: {0}")]
    Store(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("stored roles for {username} are unreadable: {message}")]
    CorruptRoles { username: String, message: String },
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;
