use url::Url;

use crate::error::ChatApiError;

/// Default backend address (local FastAPI dev server).
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

pub const STREAM_PATH: &str = "/api/agent/chat/stream";
pub const FILE_READ_PATH: &str = "/api/files/read";
pub const MODELS_PATH: &str = "/api/agent/models/list";

/// Normalize a base URL to the chat stream endpoint.
///
/// Normalization rules:
/// 1) keep `/api/agent/chat/stream` unchanged
/// 2) append `/agent/chat/stream` when path ends in `/api`
/// 3) append `/api/agent/chat/stream` otherwise
pub fn stream_endpoint(input: &str) -> Result<String, ChatApiError> {
    let trimmed = normalize_base_url(input)?;
    if trimmed.ends_with(STREAM_PATH) {
        return Ok(trimmed);
    }
    if trimmed.ends_with("/api") {
        return Ok(format!("{trimmed}/agent/chat/stream"));
    }
    Ok(format!("{trimmed}{STREAM_PATH}"))
}

/// Backend root derived from any configured base: strips a trailing
/// `/api/agent/chat/stream` or `/api` so sibling endpoints can be joined.
pub fn backend_root(input: &str) -> Result<String, ChatApiError> {
    let trimmed = normalize_base_url(input)?;
    let root = trimmed
        .strip_suffix(STREAM_PATH)
        .or_else(|| trimmed.strip_suffix("/api"))
        .unwrap_or(&trimmed);
    Ok(root.to_string())
}

/// Validates the URL and removes trailing slashes; blank input selects the default.
pub fn normalize_base_url(input: &str) -> Result<String, ChatApiError> {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let parsed = Url::parse(base).map_err(|error| ChatApiError::InvalidBaseUrl(format!("{base}: {error}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ChatApiError::InvalidBaseUrl(format!(
            "{base}: unsupported scheme '{}'",
            parsed.scheme()
        )));
    }

    Ok(base.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::{backend_root, stream_endpoint};

    #[test]
    fn stream_endpoint_keeps_full_path() {
        assert_eq!(
            stream_endpoint("http://host:8000/api/agent/chat/stream").expect("valid"),
            "http://host:8000/api/agent/chat/stream"
        );
    }

    #[test]
    fn stream_endpoint_extends_api_prefix() {
        assert_eq!(
            stream_endpoint("http://host:8000/api/").expect("valid"),
            "http://host:8000/api/agent/chat/stream"
        );
    }

    #[test]
    fn stream_endpoint_appends_full_path_to_bare_host() {
        assert_eq!(
            stream_endpoint("").expect("default is valid"),
            "http://localhost:8000/api/agent/chat/stream"
        );
    }

    #[test]
    fn stream_endpoint_rejects_non_http_scheme() {
        assert!(stream_endpoint("ftp://host").is_err());
        assert!(stream_endpoint("not a url").is_err());
    }

    #[test]
    fn backend_root_strips_known_suffixes() {
        assert_eq!(
            backend_root("https://edit.example/api/agent/chat/stream").expect("valid"),
            "https://edit.example"
        );
        assert_eq!(
            backend_root("https://edit.example/api").expect("valid"),
            "https://edit.example"
        );
    }
}
