//! Turns a chunked HTTP body into decoded text fragments.
//!
//! Both backends deliver one record per line (SSE `data:` lines for Gemini,
//! NDJSON for Ollama), so framing is shared and only the per-line decoder
//! differs. A body that ends before the decoder has seen its completion
//! marker counts as an interrupted stream.

use futures_util::{Stream, StreamExt, stream};
use std::fmt::Display;
use std::io::{self, Cursor};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio_util::io::StreamReader;
use tracing::debug;

use super::FragmentStream;
use crate::error::ChatError;

/// What a single line of the body contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEvent {
    pub text: Option<String>,
    pub finished: bool,
}

impl LineEvent {
    pub fn skip() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            finished: false,
        }
    }
}

struct FramingState<R, F> {
    lines: Lines<R>,
    decode: F,
    completed: bool,
    exhausted: bool,
}

/// Drives `body` through `decode`, yielding non-empty text fragments.
///
/// The returned stream ends after the first error.
pub fn fragment_stream<'a, S, B, E, F>(body: S, decode: F) -> FragmentStream<'a>
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'a,
    B: AsRef<[u8]> + Send + Unpin + 'a,
    E: Display + Send + 'a,
    F: FnMut(&str) -> Result<LineEvent, ChatError> + Send + 'a,
{
    let chunks = body.map(|chunk| {
        chunk
            .map(Cursor::new)
            .map_err(|err| io::Error::other(err.to_string()))
    });
    let state = FramingState {
        lines: BufReader::new(StreamReader::new(chunks)).lines(),
        decode,
        completed: false,
        exhausted: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if state.exhausted {
                return None;
            }

            let line = match state.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    state.exhausted = true;
                    if state.completed {
                        debug!("response body complete");
                        return None;
                    }
                    let err = ChatError::StreamInterrupted(
                        "response ended before the model finished".to_string(),
                    );
                    return Some((Err(err), state));
                }
                Err(err) => {
                    state.exhausted = true;
                    let err = ChatError::StreamInterrupted(format!(
                        "failed to read response body: {err}"
                    ));
                    return Some((Err(err), state));
                }
            };

            if line.trim().is_empty() {
                continue;
            }
            match (state.decode)(&line) {
                Ok(event) => {
                    state.completed |= event.finished;
                    if let Some(text) = event.text.filter(|text| !text.is_empty()) {
                        return Some((Ok(text), state));
                    }
                }
                Err(err) => {
                    state.exhausted = true;
                    return Some((Err(err), state));
                }
            }
        }
    }))
}
