use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::ChatApiConfig;
use crate::error::{parse_error_message, ChatApiError};
use crate::headers::build_headers;
use crate::payload::ChatRequest;
use crate::transport::{
    await_or_cancel, is_cancelled, CancellationSignal, ChunkStream, StreamTransport,
};
use crate::url::{backend_root, stream_endpoint, FILE_READ_PATH, MODELS_PATH};

/// One entry from the backend's model catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub model_name: String,
    pub model_key: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl ModelInfo {
    /// Value sent as `selected_model`.
    pub fn selection_key(&self) -> String {
        format!("{}/{}", self.provider, self.model_key)
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.model_name)
    }
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct FileReadResponse {
    content: String,
}

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
    endpoint: String,
    root: String,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let endpoint = stream_endpoint(&config.base_url)?;
        let root = backend_root(&config.base_url)?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self {
            http,
            config,
            endpoint,
            root,
        })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn stream_endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn build_headers(&self) -> Result<HeaderMap, ChatApiError> {
        let headers = build_headers(&self.config, None)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                ChatApiError::InvalidHeader {
                    name: key.clone(),
                    message: "invalid header name".to_owned(),
                }
            })?;
            let value = HeaderValue::from_str(&value).map_err(|_| ChatApiError::InvalidHeader {
                name: key.clone(),
                message: "invalid header value".to_owned(),
            })?;
            out.insert(name, value);
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        validate_request(request)?;
        let headers = self.build_headers()?;
        Ok(self.http.post(&self.endpoint).headers(headers).json(request))
    }

    /// Sends the request and returns the body as a chunk stream once the
    /// backend answers with a success status.
    pub async fn open_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationSignal,
    ) -> Result<ChunkStream, ChatApiError> {
        if is_cancelled(cancel) {
            return Err(ChatApiError::Cancelled);
        }

        let response = await_or_cancel(self.build_request(request)?.send(), cancel).await??;
        let response = self.ensure_success(response, cancel).await?;
        tracing::debug!(endpoint = %self.endpoint, "chat stream opened");

        let chunks = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(ChatApiError::from)
        });
        Ok(chunks.boxed())
    }

    /// Reads a workspace file through the backend. `Ok(None)` when the file
    /// does not exist.
    pub async fn read_file(
        &self,
        path: &str,
        cancel: &CancellationSignal,
    ) -> Result<Option<String>, ChatApiError> {
        let url = format!("{}{}", self.root, FILE_READ_PATH);
        let request = self
            .http
            .get(url)
            .headers(self.build_headers()?)
            .query(&[("path", path)]);
        let response = await_or_cancel(request.send(), cancel).await??;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.ensure_success(response, cancel).await?;
        let body = await_or_cancel(response.json::<FileReadResponse>(), cancel).await??;
        Ok(Some(body.content))
    }

    pub async fn list_models(
        &self,
        cancel: &CancellationSignal,
    ) -> Result<Vec<ModelInfo>, ChatApiError> {
        let url = format!("{}{}", self.root, MODELS_PATH);
        let request = self.http.get(url).headers(self.build_headers()?);
        let response = await_or_cancel(request.send(), cancel).await??;
        let response = self.ensure_success(response, cancel).await?;
        let body = await_or_cancel(response.json::<ModelListResponse>(), cancel).await??;
        Ok(body.models)
    }

    async fn ensure_success(
        &self,
        response: Response,
        cancel: &CancellationSignal,
    ) -> Result<Response, ChatApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = await_or_cancel(response.text(), cancel)
            .await?
            .unwrap_or_default();
        let message = parse_error_message(status, &body);
        tracing::warn!(status = status.as_u16(), %message, "backend request failed");
        Err(ChatApiError::Status(status, message))
    }
}

#[async_trait]
impl StreamTransport for ChatApiClient {
    async fn open_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationSignal,
    ) -> Result<ChunkStream, ChatApiError> {
        ChatApiClient::open_stream(self, request, cancel).await
    }
}

fn validate_request(request: &ChatRequest) -> Result<(), ChatApiError> {
    if request.query.trim().is_empty() {
        return Err(ChatApiError::InvalidRequestPayload(
            "'query' must not be empty".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_request, ChatApiClient, ModelInfo};
    use crate::config::ChatApiConfig;
    use crate::error::ChatApiError;
    use crate::payload::ChatRequest;

    #[test]
    fn blank_query_is_rejected_before_sending() {
        let error = validate_request(&ChatRequest::new("   ")).expect_err("blank query");
        assert!(matches!(error, ChatApiError::InvalidRequestPayload(_)));
        assert!(validate_request(&ChatRequest::new("hi")).is_ok());
    }

    #[test]
    fn client_resolves_stream_endpoint_from_api_prefix() {
        let client =
            ChatApiClient::new(ChatApiConfig::new("http://127.0.0.1:9/api")).expect("client");
        assert_eq!(
            client.stream_endpoint(),
            "http://127.0.0.1:9/api/agent/chat/stream"
        );
    }

    #[test]
    fn model_selection_key_joins_provider_and_model_key() {
        let model = ModelInfo {
            provider: "groq".to_owned(),
            model_name: "Llama 3.3 70B".to_owned(),
            model_key: "llama-3.3-70b".to_owned(),
            display_name: None,
        };
        assert_eq!(model.selection_key(), "groq/llama-3.3-70b");
        assert_eq!(model.label(), "Llama 3.3 70B");
    }
}
