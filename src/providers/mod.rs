pub mod framing;
pub mod gemini;
pub(crate) mod http_errors;
pub mod ollama;

use anyhow::{Result, anyhow};
use futures_util::Stream;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ChatError;
use crate::model::ChatRequest;

/// Text fragments of one response, in arrival order.
pub type FragmentStream<'a> = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send + 'a>>;

pub type ChatFuture<'a> =
    Pin<Box<dyn Future<Output = Result<FragmentStream<'a>, ChatError>> + Send + 'a>>;

/// A remote model API that streams its reply.
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn stream_chat<'a>(&'a self, request: ChatRequest) -> ChatFuture<'a>;
}

pub fn from_config(client: &Client, cfg: &Config) -> Result<Box<dyn ChatProvider>> {
    match cfg.model_provider.as_str() {
        "gemini" => {
            debug!(provider = "gemini", model = %cfg.model, "using gemini provider");
            Ok(Box::new(gemini::GeminiProvider::new(client.clone(), cfg)))
        }
        "ollama" => {
            debug!(provider = "ollama", model = %cfg.model, "using ollama provider");
            Ok(Box::new(ollama::OllamaProvider::new(client.clone(), cfg)))
        }
        other => {
            warn!(provider = %other, "unsupported model provider configured");
            Err(anyhow!(
                "Unsupported MODEL_PROVIDER='{}'. Supported providers: gemini, ollama.",
                other
            ))
        }
    }
}
