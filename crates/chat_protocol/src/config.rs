use std::collections::BTreeMap;
use std::time::Duration;

use crate::url::DEFAULT_BASE_URL;

/// Transport configuration for the agent backend.
#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    /// Base URL of the backend (scheme + host, optionally a path prefix).
    pub base_url: String,
    /// Per-provider API key lists, keyed by lowercase provider name.
    pub credentials: BTreeMap<String, Vec<String>>,
    /// URL of a locally hosted provider (Ollama).
    pub ollama_url: Option<String>,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional request timeout. Applies to connect and the whole body read,
    /// so leave unset for long agent runs.
    pub timeout: Option<Duration>,
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: BTreeMap::new(),
            ollama_url: None,
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
        }
    }
}

impl ChatApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Replaces the key list for `provider`. Blank keys are dropped.
    pub fn with_provider_keys(
        mut self,
        provider: impl Into<String>,
        keys: impl IntoIterator<Item = String>,
    ) -> Self {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty())
            .collect();
        let provider = provider.into().trim().to_ascii_lowercase();
        if keys.is_empty() {
            self.credentials.remove(&provider);
        } else {
            self.credentials.insert(provider, keys);
        }
        self
    }

    pub fn with_ollama_url(mut self, url: impl Into<String>) -> Self {
        self.ollama_url = Some(url.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}
