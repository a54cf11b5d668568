use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::framing::{LineEvent, fragment_stream};
use super::http_errors::{model_api_request_error, model_api_status_error};
use super::{ChatFuture, ChatProvider};
use crate::config::{Config, GenerationSettings};
use crate::error::ChatError;
use crate::model::{ChatRequest, MessageRole, Turn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u64,
    temperature: f32,
    top_p: f32,
    top_k: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
    generation: GenerationSettings,
}

impl GeminiProvider {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            base_url: cfg.model_base_url.clone(),
            api_key: cfg.api_key.clone(),
            timeout_secs: cfg.model_timeout_secs,
            generation: cfg.generation.clone(),
        }
    }
}

fn stream_url(base_url: &str, model: &str) -> String {
    let model = model.trim();
    let model = model.strip_prefix("models/").unwrap_or(model);
    format!(
        "{}/models/{}:streamGenerateContent?alt=sse",
        base_url.trim_end_matches('/'),
        model
    )
}

fn text_parts(turn: &Turn) -> Vec<Part> {
    turn.attachment
        .iter()
        .chain(std::iter::once(&turn.content))
        .map(|text| Part { text: text.clone() })
        .collect()
}

fn build_request(turns: &[Turn], generation: &GenerationSettings) -> GenerateContentRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for turn in turns {
        let role = match turn.role {
            // Gemini only accepts system text through systemInstruction.
            MessageRole::System => {
                system_parts.extend(text_parts(turn));
                continue;
            }
            MessageRole::User => "user",
            MessageRole::Assistant => "model",
        };
        contents.push(Content {
            role: Some(role),
            parts: text_parts(turn),
        });
    }

    GenerateContentRequest {
        system_instruction: (!system_parts.is_empty()).then_some(Content {
            role: None,
            parts: system_parts,
        }),
        contents,
        generation_config: GenerationConfig {
            max_output_tokens: generation.max_output_tokens,
            temperature: generation.temperature,
            top_p: generation.top_p,
            top_k: generation.top_k,
        },
    }
}

fn decode_sse_line(line: &str) -> Result<LineEvent, ChatError> {
    let Some(data) = line.strip_prefix("data:") else {
        // event:, id:, retry: and comment lines carry no payload.
        return Ok(LineEvent::skip());
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(LineEvent {
            text: None,
            finished: true,
        });
    }

    let chunk: StreamChunk = serde_json::from_str(data).map_err(|err| {
        ChatError::StreamInterrupted(format!("failed to decode gemini stream chunk: {err}"))
    })?;

    if let Some(error) = chunk.error {
        return Err(ChatError::StreamInterrupted(format!(
            "gemini reported an error mid-stream ({}): {}",
            error.status.as_deref().unwrap_or("unknown"),
            error.message
        )));
    }
    if let Some(reason) = chunk
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(ChatError::StreamInterrupted(format!(
            "prompt was blocked by the model API: {reason}"
        )));
    }

    let mut event = LineEvent::skip();
    for candidate in chunk.candidates {
        let parts = candidate.content.map(|content| content.parts).unwrap_or_default();
        for part in parts.into_iter().filter(|part| !part.thought) {
            if let Some(text) = part.text {
                event.text.get_or_insert_with(String::new).push_str(&text);
            }
        }
        match candidate.finish_reason.as_deref() {
            None => {}
            Some("STOP") => event.finished = true,
            Some(reason) => return Err(early_stop(reason)),
        }
    }
    Ok(event)
}

/// Any finish reason but STOP means the reply was cut off.
fn early_stop(reason: &str) -> ChatError {
    let detail = match reason {
        "MAX_TOKENS" => "reply hit the output token limit; raise MAX_OUTPUT_TOKENS".to_string(),
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            format!("reply was blocked by the model API ({reason})")
        }
        other => format!("model stopped early ({other})"),
    };
    ChatError::StreamInterrupted(detail)
}

impl ChatProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn stream_chat<'a>(&'a self, request: ChatRequest) -> ChatFuture<'a> {
        Box::pin(async move {
            let api_key = self.api_key.as_deref().ok_or_else(|| {
                ChatError::MissingCredential(
                    "GOOGLE_API_KEY is not set. Export it or add it to your .env file.".to_string(),
                )
            })?;

            let api_url = stream_url(&self.base_url, &request.model);
            let body = build_request(&request.turns, &self.generation);
            debug!(
                api_url = %api_url,
                model = %request.model,
                turn_count = request.turns.len(),
                "sending gemini stream request"
            );

            let response = self
                .client
                .post(&api_url)
                .header("x-goog-api-key", api_key)
                .timeout(Duration::from_secs(self.timeout_secs))
                .json(&body)
                .send()
                .await
                .map_err(|err| {
                    warn!(
                        api_url = %api_url,
                        model = %request.model,
                        error = %err,
                        "gemini request failed"
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
                    "gemini returned non-success status"
                );
                return Err(model_api_status_error(status, &response_body));
            }

            Ok(fragment_stream(
                Box::pin(response.bytes_stream()),
                decode_sse_line,
            ))
        })
    }
}
