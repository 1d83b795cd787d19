//! OpenRouter chat-completions client.
//!
//! Works with any OpenAI-compatible `/chat/completions` endpoint; the
//! OpenRouter attribution headers are simply extra headers elsewhere.
//!
//! Supports:
//! - Non-streaming completions with tool calls
//! - Streaming SSE completions through [`crate::sse`]

use std::time::{Duration, Instant};

use async_trait::async_trait;
use basecamp_config::ProviderSettings;
use basecamp_core::error::ProviderError;
use basecamp_core::message::{ChatMessage, MessageContent};
use basecamp_core::provider::{ChatProvider, ChatRequest, ChatResponse, TokenSink, ToolChoice};
use basecamp_core::tool::ToolSpec;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::sse::decode_stream;
use crate::wire;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub struct OpenRouterProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    referer: String,
    title: String,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    /// Create a client for `base_url`. A missing key is only reported when a
    /// request is made.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: "openrouter".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            referer: "http://localhost".into(),
            title: "Basecamp".into(),
            client,
        })
    }

    /// Create a provider from loaded configuration.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        let mut provider = Self::new(&settings.base_url, settings.api_key.clone())?
            .with_client(client)
            .with_title(&settings.title);
        if let Some(referer) = &settings.referer {
            provider = provider.with_referer(referer);
        }
        Ok(provider)
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = referer.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn require_api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("OpenRouter API key is missing".into()))
    }

    /// Convert our messages to the OpenAI wire format.
    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage<'_>> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str(),
                content: m.content.as_ref(),
                name: m.name.as_deref(),
                tool_call_id: m.tool_call_id.as_deref(),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: &tc.id,
                                r#type: "function",
                                function: ApiFunction {
                                    name: &tc.name,
                                    arguments: &tc.arguments,
                                },
                            })
                            .collect(),
                    )
                },
            })
            .collect()
    }

    /// Convert tool specs to the OpenAI wire format.
    fn to_api_tools(tools: &[ToolSpec]) -> Vec<ApiToolDefinition<'_>> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function",
                function: ApiToolFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                },
            })
            .collect()
    }

    fn to_api_request(request: &ChatRequest, stream: bool) -> ApiRequest<'_> {
        ApiRequest {
            model: &request.model,
            messages: Self::to_api_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request.tools.as_deref().map(Self::to_api_tools),
            tool_choice: request.tool_choice,
            stream,
            stream_options: stream.then(|| serde_json::json!({ "include_usage": true })),
        }
    }

    /// POST the body and turn any non-2xx status into `ProviderError::Http`.
    async fn send(&self, body: &ApiRequest<'_>) -> Result<reqwest::Response, ProviderError> {
        let api_key = self.require_api_key()?;
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .header("Content-Type", "application/json");
        if body.stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(format!("OpenRouter request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let payload = response.json::<Value>().await.unwrap_or(Value::Null);
            let message = wire::parse_error_message(status.as_u16(), &payload);
            warn!(provider = %self.name, status = status.as_u16(), message = %message, "Provider returned error");
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message,
                payload,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let started = Instant::now();
        let body = Self::to_api_request(request, false);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            "Sending completion request"
        );

        let response = self.send(&body).await?;
        let status = response.status().as_u16();

        let payload: Value = response.json().await.map_err(|e| {
            ProviderError::ResponseValidation(format!("Unable to parse OpenRouter response JSON: {e}"))
        })?;

        let message = wire::parse_assistant_message(&payload)?;

        Ok(ChatResponse {
            message,
            usage: wire::parse_usage(&payload),
            model: wire::parse_model(&payload),
            finish_reason: wire::parse_finish_reason(&payload),
            status,
            duration_ms: started.elapsed().as_millis() as u64,
            chunk_count: 0,
        })
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        on_token: &mut TokenSink<'_>,
    ) -> Result<ChatResponse, ProviderError> {
        let started = Instant::now();
        let body = Self::to_api_request(request, true);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self.send(&body).await?;
        let status = response.status().as_u16();

        if response.content_length() == Some(0) {
            return Err(ProviderError::StreamUnavailable(
                "OpenRouter returned an empty response body".into(),
            ));
        }

        let summary = decode_stream(response.bytes_stream(), on_token).await?;

        debug!(
            provider = %self.name,
            chunks = summary.chunk_count,
            model = summary.model.as_deref().unwrap_or("-"),
            "Stream complete"
        );

        Ok(ChatResponse {
            message: ChatMessage::assistant(summary.text),
            usage: summary.usage,
            model: summary.model,
            finish_reason: summary.finish_reason,
            status,
            duration_ms: started.elapsed().as_millis() as u64,
            chunk_count: summary.chunk_count,
        })
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiToolDefinition<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall<'a>>>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall<'a> {
    id: &'a str,
    r#type: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition<'a> {
    r#type: &'static str,
    function: ApiToolFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}
