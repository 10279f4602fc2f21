//! Remote chat-model clients.
//!
//! [`ChatModel`] is the single seam between the chain and a hosted LLM:
//! one prompt in, one [`ModelReply`] out. Two providers implement it:
//! - **[`GeminiModel`]**: `POST {base}/v1beta/models/{model}:generateContent`
//!   with the key in the `x-goog-api-key` header.
//! - **[`OpenAiModel`]**: `POST {base}/v1/chat/completions`, usable against
//!   OpenAI or any compatible local server.
//!
//! Calls are never retried. Non-2xx responses become errors carrying the
//! provider status and body. A 2xx body that is not the provider's usual
//! mapping is returned as [`ModelReply::RawText`] rather than rejected.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// One generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    /// The output token limit was hit; the text is cut off.
    Length,
    Other,
}

/// A model response, resolved once at the provider boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// A well-formed provider mapping.
    Answer { text: String, finish: FinishReason },
    /// Anything else; the body itself is the answer.
    RawText { text: String },
}

impl ModelReply {
    pub fn text(&self) -> &str {
        match self {
            ModelReply::Answer { text, .. } | ModelReply::RawText { text } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ModelReply::Answer { text, .. } | ModelReply::RawText { text } => text,
        }
    }

    /// Whether the provider reported a length cut-off.
    pub fn truncated(&self) -> bool {
        matches!(
            self,
            ModelReply::Answer {
                finish: FinishReason::Length,
                ..
            }
        )
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply>;
}

/// Create the model named by `llm.provider`.
///
/// | Config Value | Provider | Key variable |
/// |--------------|----------|--------------|
/// | `"gemini"` | [`GeminiModel`] | `GOOGLE_API_KEY` |
/// | `"openai"` | [`OpenAiModel`] | `OPENAI_API_KEY` (optional with a custom `url`) |
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiModel::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

fn build_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Send once and return the body of a 2xx response.
async fn send(request: reqwest::RequestBuilder, label: &str) -> Result<String> {
    let response = request
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("{} connection error: {}", label, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", label, status, body);
    }
    response
        .text()
        .await
        .map_err(|e| anyhow::anyhow!("{} read error: {}", label, e))
}

fn raw(body: &str, value: Option<&Value>) -> ModelReply {
    let text = match value {
        Some(Value::String(s)) => s.clone(),
        _ => body.to_string(),
    };
    ModelReply::RawText { text }
}

// ============ Gemini ============

pub struct GeminiModel {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let var = config.api_key_var();
        let api_key = std::env::var(var)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", var))?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config
                .url
                .as_deref()
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: build_client(config)?,
        })
    }
}

#[async_trait]
impl ChatModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply> {
        let mut generation = serde_json::json!({ "temperature": request.temperature });
        if let Some(max) = request.max_output_tokens {
            generation["maxOutputTokens"] = serde_json::json!(max);
        }
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": generation,
        });

        let http = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body);

        let text = send(http, "Gemini").await?;
        parse_gemini_reply(&text)
    }
}

/// Interpret a `generateContent` response body.
pub fn parse_gemini_reply(body: &str) -> Result<ModelReply> {
    let value: Option<Value> = serde_json::from_str(body).ok();
    let Some(obj) = value.as_ref().and_then(Value::as_object) else {
        return Ok(raw(body, value.as_ref()));
    };

    if let Some(error) = obj.get("error") {
        bail!("Gemini API error: {}", error);
    }

    let Some(candidate) = obj
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    else {
        if let Some(reason) = obj
            .get("promptFeedback")
            .and_then(|f| f.get("blockReason"))
            .and_then(|r| r.as_str())
        {
            bail!("Gemini blocked the prompt: {}", reason);
        }
        return Ok(raw(body, value.as_ref()));
    };

    let reason = candidate.get("finishReason").and_then(|r| r.as_str());
    let finish = match reason {
        None | Some("STOP") => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some(_) => FinishReason::Other,
    };

    let Some(parts) = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    else {
        // A candidate cut off before producing any text has no parts.
        return match (reason, finish) {
            (None, _) => Ok(raw(body, value.as_ref())),
            (Some(reason), FinishReason::Other) => {
                bail!("Gemini stopped without an answer: {}", reason)
            }
            (Some(_), finish) => Ok(ModelReply::Answer {
                text: String::new(),
                finish,
            }),
        };
    };

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    Ok(ModelReply::Answer { text, finish })
}

// ============ OpenAI-compatible ============

pub struct OpenAiModel {
    model: String,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let var = config.api_key_var();
        let api_key = std::env::var(var).ok();
        if api_key.is_none() && config.url.is_none() {
            bail!("{} environment variable not set", var);
        }

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config
                .url
                .as_deref()
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: build_client(config)?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": request.temperature,
        });
        if let Some(max) = request.max_output_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }

        let mut http = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            http = http.header("Authorization", format!("Bearer {}", key));
        }

        let text = send(http, "OpenAI").await?;
        parse_openai_reply(&text)
    }
}

/// Interpret a `chat/completions` response body.
pub fn parse_openai_reply(body: &str) -> Result<ModelReply> {
    let value: Option<Value> = serde_json::from_str(body).ok();
    let Some(obj) = value.as_ref().and_then(Value::as_object) else {
        return Ok(raw(body, value.as_ref()));
    };

    if let Some(error) = obj.get("error") {
        bail!("OpenAI API error: {}", error);
    }

    let Some(choice) = obj
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    else {
        return Ok(raw(body, value.as_ref()));
    };

    let Some(text) = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
    else {
        return Ok(raw(body, value.as_ref()));
    };

    let finish = match choice.get("finish_reason").and_then(|r| r.as_str()) {
        None | Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some(_) => FinishReason::Other,
    };

    Ok(ModelReply::Answer {
        text: text.to_string(),
        finish,
    })
}
