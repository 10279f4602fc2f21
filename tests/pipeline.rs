//! End-to-end tests of the chat pipeline against fake providers.
//!
//! The embedder maps a small vocabulary onto fixed dimensions and the chat
//! model replays scripted replies while recording every prompt it receives,
//! so these tests exercise loading, chunking, the SQLite index, retrieval,
//! prompting and the session without any network access.

use anyhow::Result;
use async_trait::async_trait;
use docs_assistant::config::Config;
use docs_assistant::continuation::CONTINUE_PROMPT;
use docs_assistant::embedding::EmbeddingProvider;
use docs_assistant::index;
use docs_assistant::llm::{ChatModel, CompletionRequest, FinishReason, ModelReply};
use docs_assistant::models::Role;
use docs_assistant::search::RetrievalParams;
use docs_assistant::session::{Session, SessionError};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ─── Fake embedder ──────────────────────────────────────────────────

const VOCABULARY: &[&str] = &[
    "leave", "days", "vacation", "salary", "salaries", "paid", "payroll", "employee", "new",
    "onboarding", "sick", "holiday", "overtime", "expense", "claims",
];

/// One dimension per vocabulary word plus a constant bias dimension.
struct VocabularyEmbedder {
    texts_embedded: AtomicUsize,
}

impl VocabularyEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            texts_embedded: AtomicUsize::new(0),
        })
    }

    fn count(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for VocabularyEmbedder {
    fn model_name(&self) -> &str {
        "vocabulary-test"
    }

    fn dims(&self) -> usize {
        VOCABULARY.len() + 1
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; VOCABULARY.len() + 1];
                v[VOCABULARY.len()] = 0.1;
                let lower = text.to_lowercase();
                for word in lower.split(|c: char| !c.is_alphanumeric()) {
                    if let Some(i) = VOCABULARY.iter().position(|w| *w == word) {
                        v[i] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

/// Embeds the first batch, then fails every later call.
struct FailsAfterFirstBatch {
    inner: Arc<VocabularyEmbedder>,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FailsAfterFirstBatch {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            anyhow::bail!("connection reset by embedding service");
        }
        self.inner.embed(texts).await
    }
}

// ─── Scripted chat model ────────────────────────────────────────────

struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<ModelReply, String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn answers(texts: &[&str]) -> Arc<Self> {
        Self::new(texts.iter().map(|t| Ok(answer(t))).collect())
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

fn answer(text: &str) -> ModelReply {
    ModelReply::Answer {
        text: text.to_string(),
        finish: FinishReason::Stop,
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(answer("No further scripted replies.")),
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn write_docs(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("leave_policy.md"),
        "# Leave policy\n\nEmployees get 20 days leave.",
    )
    .unwrap();
    fs::write(
        dir.join("payroll.md"),
        "# Payroll\n\nSalaries are paid on the last working day of the month.",
    )
    .unwrap();
    fs::write(
        dir.join("add_new_employee.md"),
        "# Add a new employee\n\nOpen **Employees** and click `New`.",
    )
    .unwrap();
}

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.docs.dir = root.join("hrms_docs");
    config.index.path = root.join("index");
    config
}

async fn ready_session(
    config: &Config,
    model: Arc<ScriptedModel>,
) -> (Session, Arc<VocabularyEmbedder>) {
    let embedder = VocabularyEmbedder::new();
    let session = Session::bootstrap_with(config, embedder.clone(), model).await;
    assert!(session.is_ready(), "setup failed: {:?}", session.setup_error());
    (session, embedder)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_turn_answers_from_retrieved_chunk_without_condensing() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);

    let model = ScriptedModel::answers(&["Employees receive 20 days of leave each year."]);
    let (mut session, _) = ready_session(&config, model.clone()).await;

    let outcome = session.ask("How many leave days?").await.unwrap();

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1, "first turn must not call the condense step");
    assert!(prompts[0].contains("Employees get 20 days leave."));
    assert!(prompts[0].contains("### Feature: leave_policy"));
    assert!(prompts[0].contains("Question:\nHow many leave days?"));

    assert_eq!(outcome.answer, "Employees receive 20 days of leave each year.");
    assert_eq!(outcome.standalone_question, "How many leave days?");
    assert_eq!(outcome.sources[0].feature, "leave_policy");
    assert!(!outcome.incomplete);

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "How many leave days?");
    assert_eq!(history[1].role, Role::Assistant);
}

#[tokio::test]
async fn test_follow_up_is_condensed_before_retrieval() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);

    let model = ScriptedModel::answers(&[
        "Twenty days.",
        "  How are salaries paid in payroll?  ",
        "Salaries are paid monthly.",
    ]);
    let (mut session, _) = ready_session(&config, model.clone()).await;

    session.ask("How many leave days?").await.unwrap();
    let outcome = session.ask("And what about pay?").await.unwrap();

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains("Human: How many leave days?\nAssistant: Twenty days."));
    assert!(prompts[1].contains("Follow Up Input: And what about pay?"));
    assert!(!prompts[1].contains("Human: And what about pay?"));

    assert_eq!(outcome.standalone_question, "How are salaries paid in payroll?");
    assert_eq!(outcome.sources[0].feature, "payroll");
    assert!(prompts[2].contains("Salaries are paid on the last working day"));
    assert!(prompts[2].contains("Question:\nAnd what about pay?"));
}

#[tokio::test]
async fn test_empty_rewrite_falls_back_to_question() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);

    let model = ScriptedModel::answers(&["First.", "   ", "Second."]);
    let (mut session, _) = ready_session(&config, model).await;

    session.ask("How many leave days?").await.unwrap();
    let outcome = session.ask("What about sick days?").await.unwrap();
    assert_eq!(outcome.standalone_question, "What about sick days?");
}

#[tokio::test]
async fn test_reopen_does_not_embed_indexed_chunks() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);

    let (_, builder) = ready_session(&config, ScriptedModel::answers(&[])).await;
    assert_eq!(builder.count(), 3);
    assert!(index::index_present(&config.index.path));

    let (mut session, reader) = ready_session(&config, ScriptedModel::answers(&["ok"])).await;
    assert_eq!(reader.count(), 0);

    session.ask("How many leave days?").await.unwrap();
    assert_eq!(reader.count(), 1, "only the query is embedded");
}

#[tokio::test]
async fn test_rebuilding_unchanged_docs_adds_no_duplicates() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);
    let embedder = VocabularyEmbedder::new();

    let (_, first) = index::build_persisted(&config, embedder.clone()).await.unwrap();
    let (handle, second) = index::build_persisted(&config, embedder.clone()).await.unwrap();
    assert_eq!(first.embedded, 3);
    assert_eq!(second.embedded, 0);
    assert_eq!(second.unchanged, 3);
    assert_eq!(handle.status().await.unwrap().entries, 3);

    let (handle, rebuilt) = index::rebuild_persisted(&config, embedder.clone())
        .await
        .unwrap();
    assert_eq!(rebuilt.embedded, 3);
    let status = handle.status().await.unwrap();
    assert_eq!(status.entries, 3);
    assert_eq!(status.documents, 3);
    assert_eq!(status.collection, "hrms_collection");
}

#[tokio::test]
async fn test_incremental_build_picks_up_changes() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);
    let embedder = VocabularyEmbedder::new();
    index::build_persisted(&config, embedder.clone()).await.unwrap();

    fs::remove_file(config.docs.dir.join("payroll.md")).unwrap();
    fs::write(
        config.docs.dir.join("leave_policy.md"),
        "# Leave policy\n\nEmployees get 25 days leave.",
    )
    .unwrap();

    let (handle, stats) = index::build_persisted(&config, embedder).await.unwrap();
    assert_eq!(stats.embedded, 1);
    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.removed, 1);
    assert_eq!(handle.status().await.unwrap().documents, 2);
}

#[tokio::test]
async fn test_retrieval_never_exceeds_k() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);
    for i in 0..5 {
        fs::write(
            config.docs.dir.join(format!("holiday_{}.md", i)),
            format!("Holiday rule {} about leave days.", i),
        )
        .unwrap();
    }

    let (handle, _) = index::build_persisted(&config, VocabularyEmbedder::new())
        .await
        .unwrap();

    let params = RetrievalParams {
        k: 2,
        fetch_k: 10,
        lambda: 0.5,
        diversity: true,
    };
    assert_eq!(handle.retrieve("leave days", &params).await.unwrap().len(), 2);

    let plain = RetrievalParams {
        diversity: false,
        ..params
    };
    assert_eq!(handle.retrieve("leave days", &plain).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_continuation_loop_until_complete() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);

    let model = ScriptedModel::answers(&[
        "First, open the Employees page...",
        "How do I continue adding an employee?",
        "Then fill in the form. The next step",
        "How do I continue adding an employee?",
        "Finally, click Save.",
    ]);
    let (mut session, _) = ready_session(&config, model.clone()).await;

    let outcome = session.ask("How do I add a new employee?").await.unwrap();
    assert!(outcome.incomplete);
    assert!(session.last_answer_incomplete());

    let outcome = session.continue_answer().await.unwrap();
    assert!(outcome.incomplete);

    let outcome = session.continue_answer().await.unwrap();
    assert!(!outcome.incomplete);
    assert!(!session.last_answer_incomplete());

    let history = session.history();
    assert_eq!(history.len(), 6);
    assert_eq!(history[2].content, CONTINUE_PROMPT);
    assert_eq!(history[4].content, CONTINUE_PROMPT);
    assert!(model.prompts()[1].contains("Follow Up Input: Please continue"));

    assert!(matches!(
        session.continue_answer().await,
        Err(SessionError::NothingToContinue)
    ));
}

#[tokio::test]
async fn test_continuations_stop_at_limit() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.chat.max_continuations = 2;
    write_docs(&config.docs.dir);

    let model = ScriptedModel::answers(&[
        "Part one...",
        "rewrite",
        "Part two...",
        "rewrite",
        "Part three...",
    ]);
    let (mut session, _) = ready_session(&config, model).await;

    let first = session.ask("How does payroll work?").await.unwrap();
    assert!(first.incomplete);
    assert_eq!(first.continuations_left, 2);
    let second = session.continue_answer().await.unwrap();
    assert!(second.incomplete);
    assert_eq!(second.continuations_left, 1);
    let third = session.continue_answer().await.unwrap();
    assert!(!third.incomplete);
    assert_eq!(third.continuations_left, 0);
    assert!(matches!(
        session.continue_answer().await,
        Err(SessionError::NothingToContinue)
    ));
}

#[tokio::test]
async fn test_length_cutoff_marks_answer_incomplete() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);

    let model = ScriptedModel::new(vec![Ok(ModelReply::Answer {
        text: "Employees get twenty days.".to_string(),
        finish: FinishReason::Length,
    })]);
    let (mut session, _) = ready_session(&config, model).await;

    assert!(session.ask("How many leave days?").await.unwrap().incomplete);
}

#[tokio::test]
async fn test_raw_text_reply_is_the_answer() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);

    let model = ScriptedModel::new(vec![Ok(ModelReply::RawText {
        text: "{\"unexpected\": true}".to_string(),
    })]);
    let (mut session, _) = ready_session(&config, model).await;

    let outcome = session.ask("How many leave days?").await.unwrap();
    assert_eq!(outcome.answer, "{\"unexpected\": true}");
    assert_eq!(session.history()[1].content, "{\"unexpected\": true}");
}

#[tokio::test]
async fn test_failed_turn_leaves_history_unchanged() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);

    let model = ScriptedModel::new(vec![
        Err("Gemini API error 503: overloaded".to_string()),
        Ok(answer("Twenty days.")),
    ]);
    let (mut session, _) = ready_session(&config, model).await;

    let Err(SessionError::Turn(err)) = session.ask("How many leave days?").await else {
        panic!("expected the model error to surface");
    };
    assert!(format!("{:#}", err).contains("503"));
    assert!(session.history().is_empty());

    let outcome = session.ask("How many leave days?").await.unwrap();
    assert_eq!(outcome.answer, "Twenty days.");
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn test_clear_history_keeps_index() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);

    let model = ScriptedModel::answers(&["Open the page...", "Twenty days."]);
    let (mut session, _) = ready_session(&config, model.clone()).await;

    session.ask("How do I add a new employee?").await.unwrap();
    assert!(session.last_answer_incomplete());

    session.clear_history();
    assert!(session.history().is_empty());
    assert!(!session.last_answer_incomplete());
    assert!(index::index_present(&config.index.path));

    session.ask("How many leave days?").await.unwrap();
    assert_eq!(model.prompts().len(), 2, "no condense call after clearing");

    let handle = index::open_persisted(&config.index, VocabularyEmbedder::new())
        .await
        .unwrap();
    assert_eq!(handle.status().await.unwrap().entries, 3);
}

#[tokio::test]
async fn test_missing_docs_leave_session_uninitialized() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());

    let model = ScriptedModel::answers(&[]);
    let mut session = Session::bootstrap_with(&config, VocabularyEmbedder::new(), model.clone()).await;

    assert!(!session.is_ready());
    assert!(config.docs.dir.is_dir(), "docs directory is created");
    assert!(session
        .setup_error()
        .unwrap()
        .contains("no markdown files found"));

    assert!(matches!(
        session.ask("How many leave days?").await,
        Err(SessionError::NotInitialized(_))
    ));
    assert!(matches!(
        session.continue_answer().await,
        Err(SessionError::NotInitialized(_))
    ));
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn test_empty_question_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_docs(&config.docs.dir);

    let model = ScriptedModel::answers(&[]);
    let (mut session, _) = ready_session(&config, model.clone()).await;

    assert!(matches!(
        session.ask("   ").await,
        Err(SessionError::EmptyQuestion)
    ));
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn test_interrupted_build_leaves_session_uninitialized_until_finished() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.embedding.batch_size = 1;
    write_docs(&config.docs.dir);

    let flaky = Arc::new(FailsAfterFirstBatch {
        inner: VocabularyEmbedder::new(),
        calls: AtomicUsize::new(0),
    });
    assert!(index::build_persisted(&config, flaky).await.is_err());
    assert!(index::index_present(&config.index.path));

    let model = ScriptedModel::answers(&[]);
    let embedder = VocabularyEmbedder::new();
    let session = Session::bootstrap_with(&config, embedder.clone(), model).await;
    assert!(!session.is_ready());
    assert!(
        session.setup_error().unwrap().contains("not fully built"),
        "unexpected setup error: {:?}",
        session.setup_error()
    );
    assert_eq!(embedder.count(), 0);

    let (handle, stats) = index::build_persisted(&config, embedder.clone())
        .await
        .unwrap();
    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.embedded, 2);
    assert_eq!(handle.status().await.unwrap().documents, 3);

    let (session, _) = ready_session(&config, ScriptedModel::answers(&[])).await;
    assert!(session.is_ready());
}
