//! # Docs Assistant CLI (`assist`)
//!
//! Chat with a directory of Markdown documentation. Questions are answered
//! by a hosted LLM from passages retrieved out of a local vector index.
//!
//! ## Usage
//!
//! ```bash
//! assist --config ./config/assistant.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `assist chat` | Interactive chat session |
//! | `assist ask "<question>"` | Answer one question and exit |
//! | `assist docs` | List loaded documents and their chunk counts |
//! | `assist index build` | Build or refresh the index |
//! | `assist index rebuild` | Delete and rebuild the index |
//! | `assist index status` | Show what the index contains |
//!
//! ## Examples
//!
//! ```bash
//! export GOOGLE_API_KEY=...
//!
//! # Index ./hrms_docs and start chatting
//! assist chat
//!
//! # One-shot question, following up on truncated answers
//! assist ask "How do I add a new employee?" --auto-continue
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docs_assistant::{chat_cmd, config, index_cmd, logging};

/// Docs Assistant — conversational Q&A over Markdown documentation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "assist",
    about = "Docs Assistant — conversational Q&A over Markdown documentation",
    version,
    long_about = "Docs Assistant loads a directory of Markdown files, indexes them into a local \
    vector store and answers questions about them through a hosted LLM, keeping the \
    conversation history for follow-up questions."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/assistant.toml`.
    #[arg(long, global = true, default_value = "./config/assistant.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session.
    ///
    /// Reopens the index if one exists, otherwise builds it from the docs
    /// directory first. Type /help at the prompt for commands.
    Chat,

    /// Answer a single question and exit.
    Ask {
        /// The question to ask.
        question: String,

        /// Keep asking the model to continue while the answer looks cut off.
        #[arg(long)]
        auto_continue: bool,
    },

    /// List the Markdown documents found in the docs directory.
    Docs,

    /// Manage the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Build the index, embedding only new or changed chunks.
    Build,
    /// Delete the index and build it from scratch.
    ///
    /// Needed after switching embedding models.
    Rebuild,
    /// Show the collection, model and entry counts.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init_with_config(&cfg.logging);

    match cli.command {
        Commands::Chat => {
            chat_cmd::run_chat(&cfg).await?;
        }
        Commands::Ask {
            question,
            auto_continue,
        } => {
            chat_cmd::run_ask(&cfg, &question, auto_continue).await?;
        }
        Commands::Docs => {
            index_cmd::run_docs(&cfg)?;
        }
        Commands::Index { action } => match action {
            IndexAction::Build => index_cmd::run_index_build(&cfg).await?,
            IndexAction::Rebuild => index_cmd::run_index_rebuild(&cfg).await?,
            IndexAction::Status => index_cmd::run_index_status(&cfg).await?,
        },
    }

    Ok(())
}
