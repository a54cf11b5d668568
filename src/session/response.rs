use futures_util::{Stream, StreamExt};
use tracing::debug;

use super::Session;
use crate::error::ChatError;
use crate::model::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerPhase {
    AwaitingFirstChunk,
    Accumulating,
}

/// Accumulates one streamed reply. Dropping it discards the text.
#[derive(Debug)]
pub struct ResponseConsumer {
    phase: ConsumerPhase,
    text: String,
    fragments: usize,
}

impl Default for ResponseConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseConsumer {
    pub fn new() -> Self {
        Self {
            phase: ConsumerPhase::AwaitingFirstChunk,
            text: String::new(),
            fragments: 0,
        }
    }

    pub fn phase(&self) -> ConsumerPhase {
        self.phase
    }

    pub fn push(&mut self, fragment: &str) {
        self.phase = ConsumerPhase::Accumulating;
        self.fragments += 1;
        self.text.push_str(fragment);
    }

    /// The complete reply; an empty one is not a usable turn.
    pub fn finish(self) -> Result<String, ChatError> {
        if self.text.trim().is_empty() {
            return Err(ChatError::StreamInterrupted(
                "stream completed without any text".to_string(),
            ));
        }
        debug!(
            fragments = self.fragments,
            response_len = self.text.len(),
            "response stream complete"
        );
        Ok(self.text)
    }

    /// Pulls `stream` to the end, forwarding each fragment to `on_fragment`.
    pub async fn drive<S, F>(mut self, stream: S, mut on_fragment: F) -> Result<String, ChatError>
    where
        S: Stream<Item = Result<String, ChatError>>,
        F: FnMut(&str),
    {
        let mut stream = std::pin::pin!(stream);
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    on_fragment(&fragment);
                    self.push(&fragment);
                }
                Err(err) => {
                    debug!(
                        phase = ?self.phase,
                        discarded_len = self.text.len(),
                        error = %err,
                        "discarding partial response"
                    );
                    return Err(err);
                }
            }
        }
        self.finish()
    }
}

impl Session {
    /// Consumes a streamed reply and appends it as one assistant turn.
    /// On error nothing is appended.
    pub async fn receive<S, F>(&mut self, stream: S, on_fragment: F) -> Result<String, ChatError>
    where
        S: Stream<Item = Result<String, ChatError>>,
        F: FnMut(&str),
    {
        let reply = ResponseConsumer::new().drive(stream, on_fragment).await?;
        self.history.push(Message::assistant(reply.clone()));
        Ok(reply)
    }
}
