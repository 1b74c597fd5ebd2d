//! # ragdesk
//!
//! A grounded question answering service over a flat corpus of text.
//!
//! Administrators post raw text, which is split into overlapping chunks,
//! embedded, and stored. Users ask questions; the closest chunks are handed
//! to a language model that may answer only from them, and the chunks used
//! are returned alongside the answer.
//!
//! ## Architecture
//!
//! ```text
//!  text ──▶ Chunker ──▶ Embedder ──▶ VectorStore (SQLite)
//!                                        │
//!  question ──▶ Embedder ──▶ nearest(k) ─┘──▶ Answerer ──▶ LanguageModel
//!
//!  every HTTP entry point passes the AuthGate (session cookie + role) first
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`chunk`] | Overlapping fixed-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector`] | Typed vectors and distance metrics |
//! | [`store`] | Vector storage (SQLite, in-memory) |
//! | [`retriever`] | Ingestion and top-k retrieval |
//! | [`generation`] | Language model abstraction |
//! | [`answer`] | Grounded prompt assembly and answering |
//! | [`auth`] | Passwords, session tokens, role gating |
//! | [`app`] | Composition root |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod app;
pub mod auth;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod retriever;
pub mod server;
pub mod store;
pub mod vector;
