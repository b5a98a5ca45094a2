//! OpenAI-compatible chat completions client
//!
//! Talks to any endpoint exposing `POST {base_url}/chat/completions` with
//! bearer authentication. The default base URL is Gemini's compatibility
//! layer.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::sse::{decode_sse, extract_error_summary};
use super::traits::{ChatModel, ChatRequest, Completion, ModelStream, ToolCall};
use crate::config::ModelSettings;
use crate::credentials::ApiKey;
use crate::error::{Error, Result};

/// Longest error body kept in `Error::RemoteStatus`
const MAX_ERROR_BODY: usize = 512;

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Client configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub connect_timeout: Duration,
    /// `None` leaves long generations unbounded
    pub request_timeout: Option<Duration>,
}

impl OpenAiConfig {
    pub fn from_settings(settings: &ModelSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            request_timeout: match settings.request_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// Join an API path onto a base URL regardless of trailing slashes
pub fn construct_api_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// ─────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireAssistantMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl<'a> WireRequest<'a> {
    fn new(model: &'a str, request: &'a ChatRequest, stream: bool) -> Self {
        let mut messages = Vec::with_capacity(request.history.len() + 1);
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.history.iter().map(|turn| WireMessage {
            role: turn.role.as_str(),
            content: &turn.content,
        }));

        // Handoff tools take no arguments
        let tools = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": {
                            "type": "object",
                            "properties": {},
                            "required": [],
                            "additionalProperties": false
                        }
                    }
                })
            })
            .collect();

        Self {
            model,
            messages,
            stream,
            tools,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────

/// Chat model backed by an OpenAI-compatible HTTP endpoint
pub struct OpenAiCompatModel {
    client: Client,
    config: OpenAiConfig,
    api_key: ApiKey,
    endpoint: String,
}

impl OpenAiCompatModel {
    pub fn new(config: OpenAiConfig, api_key: ApiKey) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(format!("supreme-chat/{}", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let endpoint = construct_api_url(&config.base_url, "chat/completions");

        Ok(Self {
            client,
            config,
            api_key,
            endpoint,
        })
    }

    async fn send(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response> {
        let body = WireRequest::new(&self.config.model, request, stream);

        debug!(
            endpoint = %self.endpoint,
            messages = body.messages.len(),
            tools = body.tools.len(),
            stream,
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Model endpoint rejected request");
            return Err(Error::RemoteStatus {
                status: status.as_u16(),
                body: summarize_error_body(&text),
            });
        }

        Ok(response)
    }
}

/// Reduce an error body to something fit for a chat message
fn summarize_error_body(text: &str) -> String {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&value) {
            return summary;
        }
    }
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    fn name(&self) -> &'static str {
        "openai-compat"
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn complete(&self, request: ChatRequest) -> Result<Completion> {
        let response = self.send(&request, false).await?;
        let text = response.text().await?;

        let parsed: WireResponse = serde_json::from_str(&text)
            .map_err(|e| Error::remote_malformed(format!("invalid completion body: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::remote_malformed("completion has no choices"))?;

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
            finish_reason: choice.finish_reason,
        })
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn stream(&self, request: ChatRequest) -> Result<ModelStream> {
        let response = self.send(&request, true).await?;
        Ok(decode_sse(response.bytes_stream().boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::traits::{ModelEvent, ToolSpec};
    use crate::session::Turn;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve a single canned HTTP response; the handle yields the raw request
    async fn serve_once(status: &str, content_type: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).into_owned()
        });

        (format!("http://{}/v1/", addr), handle)
    }

    fn model_for(base_url: &str) -> OpenAiCompatModel {
        let config = OpenAiConfig {
            base_url: base_url.to_string(),
            model: "test-model".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Some(Duration::from_secs(10)),
        };
        OpenAiCompatModel::new(config, ApiKey::new("sk-test")).unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest {
            system: Some("Be brief.".into()),
            history: vec![Turn::user("Hello")],
            tools: vec![ToolSpec {
                name: "transfer_to_code_genius".into(),
                description: "Coding help".into(),
            }],
        }
    }

    #[test]
    fn test_construct_api_url() {
        assert_eq!(
            construct_api_url("https://api.example.com/v1", "chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            construct_api_url("https://api.example.com/v1/", "/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_timeout_zero_is_unbounded() {
        let settings = ModelSettings {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert!(OpenAiConfig::from_settings(&settings).request_timeout.is_none());
    }

    #[test]
    fn test_wire_request_layout() {
        let req = request();
        let wire = WireRequest::new("m", &req, true);
        let value = serde_json::to_value(&wire).unwrap();

        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "Hello");
        assert_eq!(value["stream"], true);
        assert_eq!(value["tools"][0]["function"]["name"], "transfer_to_code_genius");
    }

    #[test]
    fn test_wire_request_omits_empty_tools() {
        let req = ChatRequest {
            history: vec![Turn::user("hi")],
            ..Default::default()
        };
        let value = serde_json::to_value(WireRequest::new("m", &req, false)).unwrap();
        assert!(value.get("tools").is_none());
        assert_eq!(value["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_summarize_error_body() {
        assert_eq!(
            summarize_error_body(r#"{"error":{"message":"API key not valid"}}"#),
            "API key not valid"
        );
        assert_eq!(summarize_error_body("  "), "<empty body>");
        assert_eq!(summarize_error_body("Bad Gateway"), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_complete_parses_text_and_bearer() {
        let (base, handle) = serve_once(
            "200 OK",
            "application/json",
            r#"{"choices":[{"message":{"role":"assistant","content":"Hi there!"},"finish_reason":"stop"}]}"#,
        )
        .await;

        let completion = model_for(&base).complete(request()).await.unwrap();
        assert_eq!(completion.text, "Hi there!");
        assert!(completion.tool_calls.is_empty());
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));

        let raw = handle.await.unwrap();
        assert!(raw.starts_with("POST /v1/chat/completions"));
        assert!(raw.to_lowercase().contains("authorization: bearer sk-test"));
        assert!(raw.contains("\"model\":\"test-model\""));
    }

    #[tokio::test]
    async fn test_complete_parses_tool_calls() {
        let (base, _handle) = serve_once(
            "200 OK",
            "application/json",
            r#"{"choices":[{"message":{"content":null,"tool_calls":[{"id":"c1","type":"function","function":{"name":"transfer_to_code_genius","arguments":"{}"}}]},"finish_reason":"tool_calls"}]}"#,
        )
        .await;

        let completion = model_for(&base).complete(request()).await.unwrap();
        assert_eq!(completion.text, "");
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "transfer_to_code_genius");
    }

    #[tokio::test]
    async fn test_status_error_is_remote_status() {
        let (base, _handle) = serve_once(
            "401 Unauthorized",
            "application/json",
            r#"{"error":{"message":"API key not valid"}}"#,
        )
        .await;

        let err = model_for(&base).complete(request()).await.unwrap_err();
        match err {
            Error::RemoteStatus { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "API key not valid");
            }
            other => panic!("expected RemoteStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (base, _handle) = serve_once("200 OK", "application/json", "<html>oops</html>").await;
        let err = model_for(&base).complete(request()).await.unwrap_err();
        assert!(matches!(err, Error::RemoteMalformed { .. }));
    }

    #[tokio::test]
    async fn test_stream_yields_deltas() {
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there!\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n"
        );
        let (base, handle) = serve_once("200 OK", "text/event-stream", sse).await;

        let stream = model_for(&base).stream(request()).await.unwrap();
        let events: Vec<ModelEvent> = stream.map(|e| e.unwrap()).collect().await;

        assert_eq!(
            events,
            vec![
                ModelEvent::Text("Hi".into()),
                ModelEvent::Text(" there!".into()),
                ModelEvent::Finished {
                    reason: Some("stop".into())
                },
            ]
        );
        assert!(handle.await.unwrap().contains("\"stream\":true"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = model_for(&format!("http://{}/v1", addr))
            .complete(request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteTransport(_)));
        assert!(err.is_remote());
    }
}
