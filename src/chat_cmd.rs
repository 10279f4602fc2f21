//! Terminal chat surface.
//!
//! [`run_chat`] is an interactive loop over stdin; [`run_ask`] answers one
//! question and exits. Both drive a [`Session`] and print answers to stdout.

use anyhow::{bail, Result};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::models::{ChatTurn, Role};
use crate::session::{Session, SessionError, TurnOutcome};

/// A line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput<'a> {
    Ask(&'a str),
    Continue,
    Clear,
    History,
    Help,
    Quit,
    Unknown(&'a str),
}

impl<'a> ChatInput<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if !line.starts_with('/') {
            return ChatInput::Ask(line);
        }
        match line {
            "/continue" => ChatInput::Continue,
            "/clear" => ChatInput::Clear,
            "/history" => ChatInput::History,
            "/help" => ChatInput::Help,
            "/quit" | "/exit" => ChatInput::Quit,
            other => ChatInput::Unknown(other),
        }
    }
}

pub async fn run_chat(config: &Config) -> Result<()> {
    let product = &config.chat.product_name;
    println!("{} Service Agent", product);
    println!("Ask questions about {}. Type /help for commands.", product);

    let mut session = Session::bootstrap(config).await;
    if let Some(reason) = session.setup_error() {
        println!();
        println!("Assistant not initialized: {}", reason);
        println!(
            "Add Markdown files to {} and restart, or run `assist index build`.",
            config.docs.dir.display()
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match ChatInput::parse(&line) {
            ChatInput::Ask("") => continue,
            ChatInput::Ask(question) => {
                let result = session.ask(question).await;
                print_turn(result);
            }
            ChatInput::Continue => {
                let result = session.continue_answer().await;
                print_turn(result);
            }
            ChatInput::Clear => {
                session.clear_history();
                println!("Chat history cleared.");
            }
            ChatInput::History => print_history(session.history()),
            ChatInput::Help => print_help(),
            ChatInput::Quit => break,
            ChatInput::Unknown(command) => {
                println!("Unknown command {}. Type /help for commands.", command);
            }
        }
    }

    Ok(())
}

/// Answer `question` once. With `auto_continue`, keep requesting
/// continuations while the answer looks incomplete and the limit allows.
pub async fn run_ask(config: &Config, question: &str, auto_continue: bool) -> Result<()> {
    let mut session = Session::bootstrap(config).await;
    if let Some(reason) = session.setup_error() {
        bail!("assistant not initialized: {}", reason);
    }

    let mut outcome = session.ask(question).await?;
    println!("{}", outcome.answer);

    while auto_continue && outcome.incomplete {
        outcome = session.continue_answer().await?;
        println!();
        println!("{}", outcome.answer);
    }

    print_sources(&outcome);
    if outcome.incomplete {
        println!();
        println!("(The answer looks incomplete; rerun with --auto-continue.)");
    }
    Ok(())
}

fn print_turn(result: Result<TurnOutcome, SessionError>) {
    match result {
        Ok(outcome) => {
            println!();
            println!("{}", outcome.answer);
            print_sources(&outcome);
            if outcome.incomplete {
                println!();
                println!(
                    "The answer looks incomplete. Type /continue to keep going ({} left).",
                    outcome.continuations_left
                );
            }
        }
        Err(SessionError::Turn(e)) => println!("Error: {:#}", e),
        Err(e) => println!("{}", e),
    }
}

fn print_sources(outcome: &TurnOutcome) {
    if outcome.sources.is_empty() {
        return;
    }
    let features: Vec<&str> = outcome
        .sources
        .iter()
        .map(|s| s.feature.as_str())
        .collect();
    println!();
    println!("Sources: {}", features.join(", "));
}

fn print_history(history: &[ChatTurn]) {
    if history.is_empty() {
        println!("No messages yet.");
        return;
    }
    for turn in history {
        let speaker = match turn.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        println!();
        println!("{}:", speaker);
        println!("{}", turn.content);
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /continue  continue an answer that looks incomplete");
    println!("  /clear     clear the chat history");
    println!("  /history   show the conversation so far");
    println!("  /help      show this help");
    println!("  /quit      exit");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ChatInput::parse("/continue"), ChatInput::Continue);
        assert_eq!(ChatInput::parse("  /clear "), ChatInput::Clear);
        assert_eq!(ChatInput::parse("/history"), ChatInput::History);
        assert_eq!(ChatInput::parse("/exit"), ChatInput::Quit);
        assert_eq!(ChatInput::parse("/nope"), ChatInput::Unknown("/nope"));
    }

    #[test]
    fn test_parse_question() {
        assert_eq!(
            ChatInput::parse(" How many leave days? "),
            ChatInput::Ask("How many leave days?")
        );
        assert_eq!(ChatInput::parse(""), ChatInput::Ask(""));
    }
}
