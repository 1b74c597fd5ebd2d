//! Composition root.
//!
//! Builds every long-lived service once from [`Config`] and hands them out
//! behind `Arc`s. Nothing in the crate reaches for global state; tests build
//! an [`AppServices`] with their own embedder and language model through
//! [`AppServices::assemble`].
//!
//! [`AdminServices`] is the database-only subset used by the account and
//! stats commands; it needs neither provider credentials nor the token secret.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::answer::Answerer;
use crate::auth::{AuthGate, TokenIssuer, UserStore};
use crate::chunk::Chunker;
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::generation::{create_language_model, LanguageModel};
use crate::migrate;
use crate::retriever::Retriever;
use crate::store::{SqliteVectorStore, VectorStore};

pub struct AppServices {
    pub config: Arc<Config>,
    pub retriever: Arc<Retriever>,
    pub answerer: Arc<Answerer>,
    pub users: UserStore,
    pub auth: AuthGate,
}

impl AppServices {
    /// Connect to the database, run migrations and create the configured providers.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;

        let embedder = create_embedder(&config.embedding)?;
        let model = create_language_model(&config.generation)?;
        let tokens = TokenIssuer::from_config(&config.auth)?;

        Self::assemble(config, pool, embedder, model, tokens)
    }

    /// Wire services from already-constructed parts. The vector store takes
    /// its dimension from the embedder.
    pub fn assemble(
        config: &Config,
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        tokens: TokenIssuer,
    ) -> Result<Self> {
        let chunker = Chunker::from_config(&config.chunking)?;
        let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(
            pool.clone(),
            embedder.dims(),
            config.retrieval.metric,
        ));

        tracing::debug!(
            embedder = embedder.model_name(),
            dims = embedder.dims(),
            model = model.model_name(),
            metric = ?config.retrieval.metric,
            "assembled services"
        );

        let retriever = Arc::new(Retriever::new(chunker, embedder, store));
        let answerer = Arc::new(Answerer::new(
            retriever.clone(),
            model,
            config.retrieval.top_k,
        ));

        Ok(Self {
            config: Arc::new(config.clone()),
            retriever,
            answerer,
            users: UserStore::new(pool),
            auth: AuthGate::new(tokens),
        })
    }
}

/// Account and record administration over the database alone.
pub struct AdminServices {
    pub users: UserStore,
    pub store: SqliteVectorStore,
}

impl AdminServices {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;

        // Counting records never compares vectors, so the dimension is informational.
        let dims = config.embedding.dims.unwrap_or(0);
        Ok(Self {
            users: UserStore::new(pool.clone()),
            store: SqliteVectorStore::new(pool, dims, config.retrieval.metric),
        })
    }
}
