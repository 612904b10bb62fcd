//! # chat: connection to an OpenAI-compatible chat endpoint
//!
//! [`fetch_reply`] opens one chat per request with a fixed system role and a
//! single user message, and returns a [`TokenShuttle`] over the streamed
//! reply. It returns as soon as the reply has started; waiting happens as the
//! caller pulls fragments from the shuttle.
//!
//! [`OpenAiCompatibleClient`] is the [`ChatModel`] used in production. It
//! posts to `/v1/chat/completions` with `stream: true` and decodes the
//! server-sent events lazily (see [`crate::sse`]).
//!
//! ## Retry
//! Connection failures and 429/5xx statuses can be retried per
//! [`RetryPolicy`](crate::config::RetryPolicy); a reply that already started
//! streaming is never retried.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::contract::{ChatMessage, ChatModel, ChatRequest, FragmentStream};
use crate::error::ChatError;
use crate::shuttle::TokenShuttle;
use crate::sse::fragment_stream;

/// System message sent with every request.
pub const SYSTEM_PROMPT: &str = "You Write Code.";

/// The two-message conversation sent for every request.
pub fn build_messages(message: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(message)]
}

/// Ask `chat` for a reply to `message` and wrap the stream in a shuttle.
///
/// `message` is passed through as is, empty or not.
pub async fn fetch_reply<M>(
    chat: &M,
    connection: &ConnectionConfig,
    model: &str,
    message: &str,
) -> Result<TokenShuttle, ChatError>
where
    M: ChatModel + ?Sized,
{
    let request = ChatRequest {
        model: model.to_string(),
        messages: build_messages(message),
    };
    let max_attempts = connection.retry.max_attempts.max(1);

    let mut attempt = 1;
    loop {
        debug!(model, attempt, prompt_bytes = message.len(), "Requesting reply");
        match chat.stream_reply(request.clone()).await {
            Ok(stream) => {
                info!(model, attempt, "Reply stream opened");
                return Ok(TokenShuttle::new(stream).with_fragment_timeout(connection.fragment_timeout));
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let backoff = connection.retry.backoff_after(attempt);
                warn!(model, attempt, error = %e, ?backoff, "Opening reply stream failed, retrying");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                error!(model, attempt, error = %e, "Opening reply stream failed");
                return Err(e);
            }
        }
    }
}

/// Streaming client for any server implementing `POST /v1/chat/completions`.
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(connection: &ConnectionConfig) -> Result<Self, ChatError> {
        let mut builder = Client::builder();
        if let Some(timeout) = connection.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().map_err(|e| ChatError::Connect {
            endpoint: connection.endpoint.clone(),
            reason: format!("failed to build HTTP client: {e}"),
        })?;

        info!(
            endpoint = %connection.endpoint,
            api_key_set = connection.api_key.as_deref().is_some_and(|k| !k.is_empty()),
            "Initialised OpenAI-compatible client"
        );
        Ok(Self {
            client,
            endpoint: connection.endpoint.clone(),
            api_key: connection.api_key.clone(),
        })
    }

    /// Completions URL, tolerating a trailing slash or an explicit `/v1`.
    pub fn completions_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl From<ChatMessage> for WireMessage {
    fn from(msg: ChatMessage) -> Self {
        Self {
            role: msg.role.as_str(),
            content: msg.content,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleClient {
    async fn stream_reply(&self, request: ChatRequest) -> Result<FragmentStream, ChatError> {
        let url = self.completions_url();
        let body = ChatCompletionRequest {
            model: request.model,
            messages: request.messages.into_iter().map(WireMessage::from).collect(),
            stream: true,
        };

        debug!(url = %url, model = %body.model, "Posting chat completion request");
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| ChatError::Connect {
            endpoint: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(fragment_stream(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::contract::{MockChatModel, Role};
    use futures::stream;
    use futures::StreamExt;
    use std::time::Duration;

    fn client_for(endpoint: &str) -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(&ConnectionConfig::new(endpoint)).unwrap()
    }

    #[test]
    fn completions_url_handles_suffixes() {
        assert_eq!(
            client_for("http://localhost:1234").completions_url(),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            client_for("http://localhost:1234/").completions_url(),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            client_for("https://api.example.com/v1/").completions_url(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn request_body_has_stream_flag_and_roles() {
        let body = ChatCompletionRequest {
            model: "m".into(),
            messages: build_messages("hi").into_iter().map(WireMessage::from).collect(),
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[tokio::test]
    async fn fetch_reply_sends_system_and_user_message() {
        let mut chat = MockChatModel::new();
        chat.expect_stream_reply()
            .withf(|req: &ChatRequest| {
                req.model == "coder"
                    && req.messages.len() == 2
                    && req.messages[0].role == Role::System
                    && req.messages[1].content.as_deref() == Some("")
            })
            .times(1)
            .returning(|_| Ok(stream::iter(vec![Ok("ok".to_string())]).boxed()));

        let connection = ConnectionConfig::new("http://unused");
        let shuttle = fetch_reply(&chat, &connection, "coder", "").await.unwrap();
        let transcript = shuttle.drain(|_| Ok::<(), ChatError>(())).await.unwrap();
        assert_eq!(transcript.text(), "ok");
    }

    #[tokio::test]
    async fn fetch_reply_retries_transient_failures() {
        let mut chat = MockChatModel::new();
        let mut calls = 0;
        chat.expect_stream_reply().times(3).returning(move |_| {
            calls += 1;
            if calls < 3 {
                Err(ChatError::Status {
                    status: 503,
                    body: "busy".into(),
                })
            } else {
                Ok(stream::iter(vec![Ok("done".to_string())]).boxed())
            }
        });

        let mut connection = ConnectionConfig::new("http://unused");
        connection.retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::ZERO,
        };
        let shuttle = fetch_reply(&chat, &connection, "coder", "task").await;
        assert!(shuttle.is_ok());
    }

    #[tokio::test]
    async fn fetch_reply_does_not_retry_client_errors() {
        let mut chat = MockChatModel::new();
        chat.expect_stream_reply().times(1).returning(|_| {
            Err(ChatError::Status {
                status: 400,
                body: "bad request".into(),
            })
        });

        let mut connection = ConnectionConfig::new("http://unused");
        connection.retry.max_attempts = 5;
        let err = fetch_reply(&chat, &connection, "coder", "task").await.unwrap_err();
        assert!(matches!(err, ChatError::Status { status: 400, .. }));
    }
}
