//! Minimal OpenAI-chat-completions-compatible client, used by the RAG
//! orchestrator (C10) to call the external model configured via
//! `LLM_API_KEY`/`LLM_MODEL`. Absence of an API key means this module is
//! never invoked — the orchestrator falls back to an extractive answer
//! (§6.3, §4.10 step 5).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Calls the configured chat-completions endpoint once. This is the read
/// path: the RAG orchestrator's extractive fallback is one `?` away from
/// any error here, so a rate-limited or failing LLM must surface
/// immediately rather than hold the request open across a retry/backoff
/// loop — that policy belongs to ingest-time synthetic-content generation,
/// not to `/chat`/`/upload-and-query` (§7).
pub async fn chat_completion(
    config: &LlmConfig,
    messages: &[ChatMessage],
    max_tokens: u32,
    top_p: Option<f32>,
) -> Result<String, AppError> {
    let api_key = config
        .api_key
        .as_deref()
        .ok_or_else(|| AppError::LLMUnavailable("no API key configured".into()))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| AppError::LLMUnavailable(e.to_string()))?;

    let body = ChatRequest {
        model: &config.model,
        messages,
        temperature: config.temperature.min(0.3),
        max_tokens,
        top_p,
    };

    let response = client
        .post(format!("{}/chat/completions", config.base_url))
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                AppError::LLMTimeout
            } else {
                AppError::LLMUnavailable(e.to_string())
            }
        })?;

    let status = response.status();

    if status.is_success() {
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMUnavailable(e.to_string()))?;
        return parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::LLMUnavailable("empty choices array".into()));
    }

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Err(AppError::LLMRateLimited { retry_after });
    }

    let body_text = response.text().await.unwrap_or_default();
    Err(AppError::LLMUnavailable(format!("{}: {}", status, body_text)))
}
