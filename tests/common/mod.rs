//! Deterministic stand-ins for the external embedding and language model services.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ragdesk::config::Config;
use ragdesk::embedding::Embedder;
use ragdesk::error::{EmbeddingServiceError, GenerationServiceError};
use ragdesk::generation::LanguageModel;
use ragdesk::vector::Embedding;
use tempfile::TempDir;

/// Embeds text as its lowercase letter histogram (26 dimensions).
pub struct LetterEmbedder {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl LetterEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }
}

pub fn letters(text: &str) -> Embedding {
    let mut v = vec![0.0f32; 26];
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
    }
    Embedding::new(v)
}

#[async_trait]
impl Embedder for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> usize {
        26
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingServiceError::Transport("connection refused".into()));
        }
        Ok(texts.iter().map(|t| letters(t)).collect())
    }
}

/// Records every prompt and replies with a fixed answer.
pub struct RecordingModel {
    pub prompts: Mutex<Vec<String>>,
    pub reply: Result<String, u16>,
}

impl RecordingModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            reply: Ok(reply.to_string()),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            reply: Err(status),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn model_name(&self) -> &str {
        "recording"
    }
    async fn complete(&self, prompt: &str) -> Result<String, GenerationServiceError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(GenerationServiceError::Api {
                status: *status,
                body: "upstream unavailable".into(),
            }),
        }
    }
}

pub fn test_config(tmp: &TempDir, port: u16) -> Config {
    let db_path = tmp.path().join("ragdesk.sqlite");
    let content = format!(
        r#"
[db]
path = "{}"

[chunking]
chunk_size = 40
overlap = 10

[retrieval]
top_k = 2

[server]
bind = "127.0.0.1:{}"
"#,
        db_path.display(),
        port
    );
    toml::from_str(&content).unwrap()
}
