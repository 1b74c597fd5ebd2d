//! Grounded answering.
//!
//! A question either short-circuits with [`NO_CONTEXT_ANSWER`] when nothing
//! relevant is stored, or is sent to the language model inside a template
//! that confines it to the retrieved chunks. The model is never called with
//! empty context.

use std::sync::Arc;

use crate::error::RagResult;
use crate::generation::LanguageModel;
use crate::models::Answer;
use crate::retriever::Retriever;

/// Reply used when retrieval finds nothing, and the phrase the model is
/// told to use when the context does not cover the question.
pub const NO_CONTEXT_ANSWER: &str = "There is no information about this in the knowledge base.";

/// Placed between retrieved chunks in the prompt.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub struct Answerer {
    retriever: Arc<Retriever>,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
}

impl Answerer {
    pub fn new(retriever: Arc<Retriever>, model: Arc<dyn LanguageModel>, top_k: usize) -> Self {
        Self {
            retriever,
            model,
            top_k,
        }
    }

    pub async fn answer(&self, question: &str) -> RagResult<Answer> {
        let context = self.retriever.retrieve_top_k(question, self.top_k).await?;

        if context.is_empty() {
            tracing::info!("no stored context for question; skipping generation");
            return Ok(Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                context_used: Vec::new(),
            });
        }

        let prompt = build_prompt(question, &context);
        let answer = self.model.complete(&prompt).await?;
        tracing::info!(
            model = self.model.model_name(),
            chunks = context.len(),
            "generated grounded answer"
        );

        Ok(Answer {
            answer,
            context_used: context,
        })
    }
}

pub fn build_prompt(question: &str, context: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are an assistant that answers questions using only the context below.\n\n");
    prompt.push_str("Rules:\n");
    prompt.push_str("1. Use only the information in the context.\n");
    prompt.push_str(&format!(
        "2. If the context does not contain the answer, reply exactly: \"{}\"\n",
        NO_CONTEXT_ANSWER
    ));
    prompt.push_str("3. Do not add facts from outside the context.\n");
    prompt.push_str("4. Answer briefly and to the point.\n\n");
    prompt.push_str("Context:\n");
    prompt.push_str(&context.join(CONTEXT_SEPARATOR));
    prompt.push_str("\n\nQuestion:\n");
    prompt.push_str(question);
    prompt.push_str("\n\nAnswer:");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_context_and_rules() {
        let context = vec!["Rust was first released in 2015.".to_string(), "Cargo builds crates.".to_string()];
        let prompt = build_prompt("When was Rust released?", &context);

        assert!(prompt.contains("Rust was first released in 2015.\n\n---\n\nCargo builds crates."));
        assert!(prompt.contains(NO_CONTEXT_ANSWER));
        assert!(prompt.contains("only"));
        assert!(prompt.ends_with("When was Rust released?\n\nAnswer:"));
    }
}
