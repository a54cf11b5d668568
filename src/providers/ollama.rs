use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::framing::{LineEvent, fragment_stream};
use super::http_errors::{model_api_request_error, model_api_status_error};
use super::{ChatFuture, ChatProvider};
use crate::config::{Config, GenerationSettings};
use crate::error::ChatError;
use crate::model::{ChatRequest, Turn};

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    stream: bool,
    messages: Vec<ChatMessage>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    top_k: u64,
    num_predict: u64,
}

#[derive(Debug, Deserialize)]
struct OllamaChatChunk {
    message: Option<ChatMessageResponse>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: String,
}

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    timeout_secs: u64,
    generation: GenerationSettings,
}

impl OllamaProvider {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            base_url: cfg.model_base_url.clone(),
            timeout_secs: cfg.model_timeout_secs,
            generation: cfg.generation.clone(),
        }
    }

    fn build_request(&self, request: &ChatRequest) -> OllamaChatRequest {
        OllamaChatRequest {
            model: request.model.clone(),
            stream: true,
            messages: to_ollama_messages(&request.turns),
            options: OllamaOptions {
                temperature: self.generation.temperature,
                top_p: self.generation.top_p,
                top_k: self.generation.top_k,
                num_predict: self.generation.max_output_tokens,
            },
        }
    }
}

fn chat_url(base_url: &str) -> String {
    format!("{}/api/chat", base_url.trim_end_matches('/'))
}

fn to_ollama_messages(turns: &[Turn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .map(|turn| ChatMessage {
            role: turn.role.as_str().to_string(),
            content: turn.flattened_content(),
        })
        .collect()
}

fn decode_ndjson_line(line: &str) -> Result<LineEvent, ChatError> {
    let chunk: OllamaChatChunk = serde_json::from_str(line.trim()).map_err(|err| {
        ChatError::StreamInterrupted(format!("failed to decode ollama stream chunk: {err}"))
    })?;

    if let Some(error) = chunk.error {
        return Err(ChatError::StreamInterrupted(format!(
            "ollama reported an error mid-stream: {error}"
        )));
    }

    Ok(LineEvent {
        text: chunk.message.map(|message| message.content),
        finished: chunk.done,
    })
}

impl ChatProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn stream_chat<'a>(&'a self, request: ChatRequest) -> ChatFuture<'a> {
        Box::pin(async move {
            let api_url = chat_url(&self.base_url);
            let body = self.build_request(&request);
            debug!(
                api_url = %api_url,
                model = %request.model,
                turn_count = request.turns.len(),
                "sending ollama chat request"
            );

            let response = self
                .client
                .post(&api_url)
                .timeout(Duration::from_secs(self.timeout_secs))
                .json(&body)
                .send()
                .await
                .map_err(|err| {
                    warn!(
                        api_url = %api_url,
                        model = %request.model,
                        error = %err,
                        "ollama request failed"
                    );
                    model_api_request_error(err, &api_url, self.timeout_secs)
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let response_body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<failed to read response body>".to_string());
                warn!(
                    api_url = %api_url,
                    model = %request.model,
                    status = %status,
                    response_body_len = response_body.len(),
                    "ollama returned non-success status"
                );
                return Err(model_api_status_error(status, &response_body));
            }

            Ok(fragment_stream(
                Box::pin(response.bytes_stream()),
                decode_ndjson_line,
            ))
        })
    }
}
