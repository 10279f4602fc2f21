//! Conversational retrieval chain.
//!
//! One user turn runs as:
//!
//! ```text
//! question + history ─► rewrite ─► retrieve ─► answer prompt ─► generate ─► ChainAnswer
//! ```
//!
//! [`ConversationalChain::rewrite`] asks the model for a standalone version of
//! the question when there is prior history, so that follow-ups like "and for
//! contractors?" retrieve the right chunks. [`ConversationalChain::generate`]
//! sends the retrieved context, the transcript and the original question in a
//! single prompt.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::index::IndexHandle;
use crate::llm::{ChatModel, CompletionRequest, ModelReply};
use crate::models::{ChatTurn, RetrievedChunk};
use crate::prompt::PromptSet;
use crate::search::RetrievalParams;

/// A document that contributed context to an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub feature: String,
    pub document_id: String,
}

#[derive(Debug, Clone)]
pub struct ChainAnswer {
    pub text: String,
    /// The question actually used for retrieval.
    pub standalone_question: String,
    /// Distinct source documents, in retrieval rank order.
    pub sources: Vec<SourceRef>,
    /// The provider stopped at its output token limit.
    pub truncated: bool,
}

pub struct ConversationalChain {
    index: IndexHandle,
    model: Arc<dyn ChatModel>,
    prompts: PromptSet,
    retrieval: RetrievalParams,
    temperature: f32,
    max_output_tokens: Option<u32>,
}

impl ConversationalChain {
    pub fn new(
        index: IndexHandle,
        model: Arc<dyn ChatModel>,
        prompts: PromptSet,
        retrieval: RetrievalParams,
    ) -> Self {
        Self {
            index,
            model,
            prompts,
            retrieval,
            temperature: 0.7,
            max_output_tokens: None,
        }
    }

    pub fn from_config(index: IndexHandle, model: Arc<dyn ChatModel>, config: &Config) -> Self {
        Self::new(
            index,
            model,
            PromptSet::new(config.chat.product_name.clone()),
            RetrievalParams::from(&config.retrieval),
        )
        .with_generation(config.llm.temperature, config.llm.max_output_tokens)
    }

    pub fn with_generation(mut self, temperature: f32, max_output_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    fn request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest {
            prompt,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }

    /// Standalone form of `question` given `history`.
    ///
    /// With no history the question is returned unchanged and the model is
    /// not called. An empty rewrite also falls back to the question.
    pub async fn rewrite(&self, question: &str, history: &[ChatTurn]) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let prompt = self.prompts.condense(history, question);
        let reply = self
            .model
            .complete(&self.request(prompt))
            .await
            .context("failed to rewrite the question")?;

        let rewritten = reply.text().trim();
        if rewritten.is_empty() {
            tracing::debug!("empty rewrite; using the question as asked");
            return Ok(question.to_string());
        }
        tracing::debug!("rewrote {:?} as {:?}", question, rewritten);
        Ok(rewritten.to_string())
    }

    /// Ask the model to answer `question` from `context`.
    pub async fn generate(
        &self,
        context: &[RetrievedChunk],
        history: &[ChatTurn],
        question: &str,
    ) -> Result<ModelReply> {
        let prompt = self.prompts.answer(context, history, question);
        self.model
            .complete(&self.request(prompt))
            .await
            .context("failed to generate an answer")
    }

    /// Run a full turn. `history` holds the turns before `question`.
    pub async fn answer(&self, question: &str, history: &[ChatTurn]) -> Result<ChainAnswer> {
        let standalone_question = self.rewrite(question, history).await?;
        let context = self
            .index
            .retrieve(&standalone_question, &self.retrieval)
            .await?;
        for chunk in &context {
            tracing::debug!("context {} (score {:.3})", chunk.chunk_id, chunk.score);
        }
        let reply = self.generate(&context, history, question).await?;

        let mut sources: Vec<SourceRef> = Vec::new();
        for chunk in &context {
            if !sources.iter().any(|s| s.document_id == chunk.document_id) {
                sources.push(SourceRef {
                    feature: chunk.metadata.feature.clone(),
                    document_id: chunk.document_id.clone(),
                });
            }
        }

        let truncated = reply.truncated();
        Ok(ChainAnswer {
            text: reply.into_text(),
            standalone_question,
            sources,
            truncated,
        })
    }
}
