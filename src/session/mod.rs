//! Conversation state for one interaction lifetime.
//!
//! History only grows: messages are appended, never edited or removed, and
//! a turn is committed only once its reply has streamed in completely.

mod request;
mod response;

pub use response::{ConsumerPhase, ResponseConsumer};

use tracing::{debug, warn};

use crate::attachments::{self, Attachment};
use crate::error::ChatError;
use crate::model::{Message, MessageRole};
use crate::providers::ChatProvider;

#[derive(Debug, Clone)]
pub struct Session {
    model: String,
    system_prompt: Option<String>,
    staged: Vec<Attachment>,
    history: Vec<Message>,
}

pub fn create_session(model: impl Into<String>, system_prompt: Option<String>) -> Session {
    Session::new(model, system_prompt)
}

impl Session {
    pub fn new(model: impl Into<String>, system_prompt: Option<String>) -> Self {
        let mut session = Self {
            model: model.into(),
            system_prompt: None,
            staged: Vec::new(),
            history: Vec::new(),
        };
        if let Some(prompt) = system_prompt {
            session.set_system_prompt(prompt);
        }
        session
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn staged_attachments(&self) -> &[Attachment] {
        &self.staged
    }

    /// Takes effect on the next request.
    pub fn set_model(&mut self, identifier: impl Into<String>) {
        self.model = identifier.into();
    }

    /// Takes effect on the next request. Blank text clears the prompt.
    pub fn set_system_prompt(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.system_prompt = (!text.trim().is_empty()).then_some(text);
    }

    /// Appends a message; blank content is ignored and `false` returned.
    pub fn append(&mut self, role: MessageRole, content: impl Into<String>) -> bool {
        let content = content.into();
        if content.trim().is_empty() {
            debug!(role = role.as_str(), "ignoring message with blank content");
            return false;
        }
        self.history.push(Message::new(role, content));
        true
    }

    pub fn stage_attachment(&mut self, attachment: Attachment) {
        self.staged.push(attachment);
    }

    pub fn unstage_attachment(&mut self, index: usize) -> Option<Attachment> {
        (index < self.staged.len()).then(|| self.staged.remove(index))
    }

    pub fn clear_staged_attachments(&mut self) {
        self.staged.clear();
    }

    /// Sends `user_text` with the history and commits the exchange once the
    /// reply completes. Errors and cancellation leave the session untouched,
    /// and blank text is refused before anything is sent.
    pub async fn submit<F>(
        &mut self,
        provider: &dyn ChatProvider,
        user_text: &str,
        on_fragment: F,
    ) -> Result<String, ChatError>
    where
        F: FnMut(&str),
    {
        if user_text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let mut pending = Message::user(user_text);
        if !self.staged.is_empty() {
            pending = pending.with_attachment(attachments::render(&self.staged));
        }

        let request = self.build_request(&pending);
        debug!(
            provider = provider.name(),
            model = %request.model,
            turn_count = request.turns.len(),
            staged_attachments = self.staged.len(),
            "submitting turn"
        );

        let stream = provider.stream_chat(request).await.map_err(|err| {
            warn!(
                provider = provider.name(),
                kind = err.kind(),
                error = %err,
                "chat request failed"
            );
            err
        })?;
        let reply = ResponseConsumer::new()
            .drive(stream, on_fragment)
            .await
            .map_err(|err| {
                warn!(
                    provider = provider.name(),
                    kind = err.kind(),
                    error = %err,
                    "response stream failed"
                );
                err
            })?;

        self.history.push(pending);
        self.history.push(Message::assistant(reply.clone()));
        self.staged.clear();
        Ok(reply)
    }
}
