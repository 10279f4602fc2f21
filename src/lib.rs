//! # Docs Assistant
//!
//! A conversational question-answering assistant over a directory of
//! Markdown documentation.
//!
//! Documents are loaded and split into overlapping chunks, embedded, and
//! persisted to a SQLite vector index. Each chat turn rewrites the question
//! against the conversation so far, retrieves diverse relevant chunks, and
//! asks a hosted LLM for an answer. Answers that look cut off can be
//! continued a bounded number of times.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────────┐
//! │ Markdown │──▶│  Chunk +  │──▶│ SQLite index  │
//! │   docs   │   │   Embed   │   │ (cosine, MMR) │
//! └──────────┘   └───────────┘   └──────┬────────┘
//!                                       │ retrieve
//!                ┌──────────┐    ┌──────▼─────┐    ┌─────────┐
//!                │ Session  │───▶│   Chain    │───▶│   LLM   │
//!                │ (assist) │◀───│ rewrite +  │◀───│ Gemini/ │
//!                └──────────┘    │  generate  │    │ OpenAI  │
//!                                └────────────┘    └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! assist index build            # embed ./hrms_docs into ./index
//! assist chat                   # ask questions interactively
//! assist ask "How many leave days do employees get?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`models`] | Core data types |
//! | [`loader`] | Markdown document discovery |
//! | [`extract`] | Markdown to plain text |
//! | [`chunk`] | Recursive text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store trait and backends |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`index`] | Index build, reopen and retrieval |
//! | [`search`] | MMR candidate selection |
//! | [`llm`] | Remote chat model clients |
//! | [`prompt`] | Prompt templates |
//! | [`chain`] | Conversational retrieval chain |
//! | [`continuation`] | Truncation detection and continuation policy |
//! | [`session`] | Chat session state |
//! | [`chat_cmd`] | Chat REPL and one-shot questions |
//! | [`index_cmd`] | Index and docs commands |

pub mod chain;
pub mod chat_cmd;
pub mod chunk;
pub mod config;
pub mod continuation;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod index_cmd;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod search;
pub mod session;
pub mod store;
