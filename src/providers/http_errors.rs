use reqwest::StatusCode;
use std::error::Error as StdError;
use std::io::ErrorKind;

use crate::error::ChatError;

const MAX_ERROR_BODY_CHARS: usize = 500;

fn error_chain_matches(
    err: &(dyn StdError + 'static),
    kind: ErrorKind,
    needle: &str,
) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }

        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }

        current = source.source();
    }

    false
}

fn error_chain_has_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn error_chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::TimedOut, "timed out")
}

/// Maps a failure to send the request (no response yet).
pub(crate) fn model_api_request_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> ChatError {
    if err.is_timeout() || error_chain_has_timeout(&err) {
        return ChatError::UpstreamUnavailable(format!(
            "model request timed out after {}s while calling '{}'. \
             Increase MODEL_TIMEOUT_SECS or check model responsiveness.",
            timeout_secs, api_url
        ));
    }

    if err.is_connect() {
        if error_chain_has_connection_refused(&err) {
            return ChatError::UpstreamUnavailable(format!(
                "connection refused by model API at '{}'. \
                 Ensure the model provider is running and MODEL_BASE_URL is correct.",
                api_url
            ));
        }

        return ChatError::UpstreamUnavailable(format!(
            "failed to connect to model API at '{}'. \
             Check MODEL_BASE_URL and network connectivity.",
            api_url
        ));
    }

    ChatError::UpstreamUnavailable(format!(
        "failed to call model API at '{}': {}",
        api_url, err
    ))
}

/// Maps a non-success status and its body.
pub(crate) fn model_api_status_error(status: StatusCode, body: &str) -> ChatError {
    let body = truncate(body.trim(), MAX_ERROR_BODY_CHARS);
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || (status == StatusCode::BAD_REQUEST && mentions_invalid_key(&body))
    {
        return ChatError::MissingCredential(format!(
            "model API rejected the API key (status {}): {}",
            status, body
        ));
    }

    ChatError::UpstreamUnavailable(format!(
        "model request failed with status {}: {}",
        status, body
    ))
}

fn mentions_invalid_key(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("api_key_invalid") || lower.contains("api key not valid")
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
