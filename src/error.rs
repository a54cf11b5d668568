use thiserror::Error;

/// Failures surfaced by a chat turn. None of them poison the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("missing or rejected credential: {0}")]
    MissingCredential(String),
    #[error("model API unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("unsupported attachment: {0}")]
    UnsupportedAttachment(String),
    #[error("response stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("message is empty; type something to send")]
    EmptyMessage,
}

impl ChatError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential(_) => "missing_credential",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::UnsupportedAttachment(_) => "unsupported_attachment",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::EmptyMessage => "empty_message",
        }
    }
}
