//! HTTP client for the Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::client::ModelClient;
use crate::conversation::{Role, Turn};
use crate::error::{Result, TransportErrorKind, TutorError};

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// API version sent with every request.
pub const API_VERSION: &str = "2023-06-01";

/// Resolves model aliases to full model ids. Anything else passes through.
#[must_use]
pub fn resolve_model(alias: &str) -> &str {
    match alias {
        "opus" => "claude-opus-4-5",
        "sonnet" => "claude-sonnet-4-5",
        "haiku" => "claude-haiku-4-5",
        _ => alias,
    }
}

/// Request body for `/v1/messages`.
#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
    /// Full model id.
    pub model: &'a str,
    /// Completion budget.
    pub max_tokens: u32,
    /// Conversation so far.
    pub messages: Vec<Message<'a>>,
}

/// A single message in the request.
#[derive(Debug, Serialize)]
pub struct Message<'a> {
    /// `user` or `assistant`.
    pub role: &'static str,
    /// Message text.
    pub content: &'a str,
}

/// Response from `/v1/messages`.
#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    /// Content blocks; only text blocks are used.
    pub content: Vec<ContentBlock>,
    /// Why generation stopped.
    pub stop_reason: Option<String>,
    /// Token usage.
    pub usage: Option<Usage>,
}

/// A content block in the response.
#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    /// Block type, e.g. `text`.
    #[serde(rename = "type")]
    pub content_type: String,
    /// Text for text blocks.
    pub text: Option<String>,
}

/// Token usage from the API response.
#[derive(Debug, Deserialize)]
pub struct Usage {
    /// Prompt tokens.
    pub input_tokens: u32,
    /// Completion tokens.
    pub output_tokens: u32,
}

impl MessagesResponse {
    /// Concatenates every text block.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// [`ModelClient`] backed by the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: Client,
    api_key: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Creates a client for the default endpoint.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::MissingApiKey` for an empty key.
    pub fn new(api_key: impl Into<String>, max_tokens: u32) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, max_tokens)
    }

    /// Creates a client for a custom endpoint (proxies, test servers).
    ///
    /// # Errors
    ///
    /// Returns `TutorError::MissingApiKey` for an empty key, or a transport
    /// error if the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        max_tokens: u32,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(TutorError::MissingApiKey);
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TutorError::transport(TransportErrorKind::Other, e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_tokens,
        })
    }

    fn build_request<'a>(&self, turns: &'a [Turn], model: &'a str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: resolve_model(model),
            max_tokens: self.max_tokens,
            messages: turns
                .iter()
                .map(|turn| Message {
                    role: match turn.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content: &turn.content,
                })
                .collect(),
        }
    }
}

/// Maps an HTTP status to a transport error kind.
fn classify_status(status: StatusCode) -> TransportErrorKind {
    match status.as_u16() {
        401 | 403 => TransportErrorKind::Authentication,
        429 => TransportErrorKind::RateLimit,
        500..=599 => TransportErrorKind::Server,
        _ => TransportErrorKind::Other,
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> TransportErrorKind {
    if e.is_timeout() {
        TransportErrorKind::Timeout
    } else if e.is_connect() || e.is_request() {
        TransportErrorKind::Network
    } else if e.is_decode() || e.is_body() {
        TransportErrorKind::Other
    } else {
        TransportErrorKind::Network
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, turns: &[Turn], model: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);
        let request = self.build_request(turns, model);

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| TutorError::transport(classify_reqwest_error(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);

            let mut message = format!("HTTP {}: {detail}", status.as_u16());
            if let Some(secs) = retry_after {
                message.push_str(&format!(" (retry after {secs}s)"));
            }
            return Err(TutorError::transport(classify_status(status), message));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            TutorError::transport(
                TransportErrorKind::Other,
                format!("failed to parse response: {e}"),
            )
        })?;

        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                stop_reason = parsed.stop_reason.as_deref().unwrap_or("unknown"),
                "Completion received"
            );
        }

        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(TutorError::transport(
                TransportErrorKind::Other,
                "response contained no text",
            ));
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}
