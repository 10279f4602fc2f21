//! Prompt templates for the two model calls in a turn.
//!
//! Placeholders are `{name}` and are substituted in a single pass, so text
//! inserted for one placeholder is never re-scanned for another.

use crate::models::{ChatTurn, RetrievedChunk, Role};

const CONDENSE_TEMPLATE: &str = "\
Given the following conversation and a follow-up question, rephrase the follow-up to be a standalone question.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

const ANSWER_TEMPLATE: &str = "\
You are an expert {product} assistant. Use the documentation below to answer the user's query.

The documentation may span multiple features. Do NOT copy-paste directly; instead, rephrase in your own words, elaborate clearly, and explain underlying logic or implications where relevant.

Always aim to help the user understand, even if the exact answer is not in the context.

Answer using a professional and approachable tone. Rephrase the answer. Don't copy paste.

Context:
{context}

Chat History:
{chat_history}

Question:
{question}

Please provide a **detailed, complete, step-by-step** explanation without stopping prematurely.

Answer:";

#[derive(Debug, Clone)]
pub struct PromptSet {
    product_name: String,
}

impl PromptSet {
    pub fn new(product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
        }
    }

    /// Prompt asking the model to rewrite `question` as a standalone question.
    pub fn condense(&self, history: &[ChatTurn], question: &str) -> String {
        render(
            CONDENSE_TEMPLATE,
            &[
                ("chat_history", &format_transcript(history)),
                ("question", question),
            ],
        )
    }

    /// Prompt asking the model to answer `question` from `context`.
    pub fn answer(&self, context: &[RetrievedChunk], history: &[ChatTurn], question: &str) -> String {
        render(
            ANSWER_TEMPLATE,
            &[
                ("product", &self.product_name),
                ("context", &join_context(context)),
                ("chat_history", &format_transcript(history)),
                ("question", question),
            ],
        )
    }
}

/// `Human: …` / `Assistant: …` lines, oldest first.
pub fn format_transcript(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::User => "Human",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Retrieved chunk texts separated by blank lines.
pub fn join_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
