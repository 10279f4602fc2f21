//! Chat session state.
//!
//! A [`Session`] owns the conversation history, the chain (and through it
//! the index handle) and the continuation tracker. It is created once per
//! process and passed by `&mut` into every turn. History lives only in
//! memory.

use std::sync::Arc;

use thiserror::Error;

use crate::chain::{ConversationalChain, SourceRef};
use crate::config::Config;
use crate::continuation::{self, ContinuationTracker, CONTINUE_PROMPT};
use crate::embedding::{self, EmbeddingProvider};
use crate::index;
use crate::llm::{self, ChatModel};
use crate::models::ChatTurn;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("assistant not initialized: {0}")]
    NotInitialized(String),
    #[error("question is empty")]
    EmptyQuestion,
    #[error("the last answer is complete; nothing to continue")]
    NothingToContinue,
    #[error(transparent)]
    Turn(#[from] anyhow::Error),
}

/// Result of one successful turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub answer: String,
    pub standalone_question: String,
    pub sources: Vec<SourceRef>,
    /// The answer looks cut off and `/continue` is available.
    pub incomplete: bool,
    pub continuations_left: u32,
}

pub struct Session {
    chain: Option<ConversationalChain>,
    setup_error: Option<String>,
    history: Vec<ChatTurn>,
    continuation: ContinuationTracker,
}

impl Session {
    pub fn new(chain: ConversationalChain, max_continuations: u32) -> Self {
        Self {
            chain: Some(chain),
            setup_error: None,
            history: Vec::new(),
            continuation: ContinuationTracker::new(max_continuations),
        }
    }

    /// A session that refuses every question with `reason`.
    pub fn uninitialized(reason: impl Into<String>, max_continuations: u32) -> Self {
        Self {
            chain: None,
            setup_error: Some(reason.into()),
            history: Vec::new(),
            continuation: ContinuationTracker::new(max_continuations),
        }
    }

    /// Build the embedder, model and index from `config`.
    ///
    /// Setup failures are logged and leave the session uninitialized instead
    /// of aborting.
    pub async fn bootstrap(config: &Config) -> Self {
        let providers = embedding::create_provider(&config.embedding)
            .and_then(|embedder| Ok((embedder, llm::create_model(&config.llm)?)));
        match providers {
            Ok((embedder, model)) => Self::bootstrap_with(config, embedder, model).await,
            Err(e) => {
                tracing::error!("setup failed: {:#}", e);
                Self::uninitialized(format!("{:#}", e), config.chat.max_continuations)
            }
        }
    }

    /// Like [`Session::bootstrap`] with explicit providers.
    pub async fn bootstrap_with(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        match index::prepare(config, embedder).await {
            Ok(handle) => {
                let chain = ConversationalChain::from_config(handle, model, config);
                Self::new(chain, config.chat.max_continuations)
            }
            Err(e) => {
                tracing::error!("index unavailable: {:#}", e);
                Self::uninitialized(format!("{:#}", e), config.chat.max_continuations)
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.chain.is_some()
    }

    pub fn setup_error(&self) -> Option<&str> {
        self.setup_error.as_deref()
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn last_answer_incomplete(&self) -> bool {
        self.continuation.is_incomplete()
    }

    /// Ask a new question.
    pub async fn ask(&mut self, question: &str) -> Result<TurnOutcome, SessionError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SessionError::EmptyQuestion);
        }
        let outcome = self.run_turn(question).await?;
        self.continuation.record_answer(outcome.incomplete);
        Ok(TurnOutcome {
            incomplete: self.continuation.is_incomplete(),
            continuations_left: self.continuation.remaining(),
            ..outcome
        })
    }

    /// Ask the model to carry on from an incomplete answer.
    pub async fn continue_answer(&mut self) -> Result<TurnOutcome, SessionError> {
        self.ensure_ready()?;
        if !self.continuation.is_incomplete() {
            return Err(SessionError::NothingToContinue);
        }
        let outcome = self.run_turn(CONTINUE_PROMPT).await?;
        self.continuation.record_continuation(outcome.incomplete);
        Ok(TurnOutcome {
            incomplete: self.continuation.is_incomplete(),
            continuations_left: self.continuation.remaining(),
            ..outcome
        })
    }

    /// Forget the conversation. The index is untouched.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.continuation.reset();
    }

    fn ensure_ready(&self) -> Result<&ConversationalChain, SessionError> {
        self.chain.as_ref().ok_or_else(|| {
            SessionError::NotInitialized(
                self.setup_error
                    .clone()
                    .unwrap_or_else(|| "no index available".to_string()),
            )
        })
    }

    /// Run the chain on `question` and the prior history. The question and
    /// its answer enter the history together, only on success.
    async fn run_turn(&mut self, question: &str) -> Result<TurnOutcome, SessionError> {
        let prior = self.history.len();
        let chain = self.ensure_ready()?;
        let result = chain.answer(question, &self.history[..prior]).await;

        let answer = match result {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("turn failed: {:#}", e);
                return Err(SessionError::Turn(e));
            }
        };

        self.history.push(ChatTurn::user(question));
        self.history.push(ChatTurn::assistant(answer.text.clone()));

        let incomplete = continuation::detect(&answer.text) || answer.truncated;
        Ok(TurnOutcome {
            answer: answer.text,
            standalone_question: answer.standalone_question,
            sources: answer.sources,
            incomplete,
            continuations_left: self.continuation.remaining(),
        })
    }
}
