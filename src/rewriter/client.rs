//! Chat completions client used as the production rewriter

use crate::config::RewriterConfig;
use crate::error::{transport_error, Error, Result};
use crate::rewriter::{strip_code_fences, CodeRewriter};
use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Client for an OpenAI-compatible chat completions API
#[derive(Clone)]
pub struct ChatClient {
    /// HTTP client with auth headers installed
    client: Client,
    /// Provider settings
    config: RewriterConfig,
}

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message providing context and instructions
    System,
    /// User message
    User,
    /// Assistant (model) response
    Assistant,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request to the chat completions API
#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    /// Model to use
    model: String,
    /// Messages in the conversation
    messages: Vec<Message>,
}

/// Response from the chat completions API
#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    /// Model that produced the completion
    model: String,
    /// Completion choices
    choices: Vec<Choice>,
    /// Usage statistics
    usage: Option<Usage>,
}

/// A completion choice
#[derive(Debug, Clone, Deserialize)]
struct Choice {
    /// The generated message
    message: Message,
}

/// Token usage statistics
#[derive(Debug, Clone, Deserialize)]
struct Usage {
    /// Total tokens used
    total_tokens: u32,
}

impl ChatClient {
    /// Create a new chat completions client
    pub fn new(config: RewriterConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();

        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(ChatClient { client, config })
    }

    /// Model used for rewrites
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send a request to the chat completions API
    async fn send_request(&self, request: ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);

        debug!(model = %request.model, "sending rewrite request");

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                Error::Rewrite(transport_error(
                    "Completion request",
                    self.config.timeout_secs,
                    e,
                ))
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Rewrite(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let body = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| Error::Rewrite(format!("Invalid completion response: {}", e)))?;

        if let Some(ref usage) = body.usage {
            info!(model = %body.model, tokens = usage.total_tokens, "rewrite completed");
        }

        Ok(body)
    }
}

#[async_trait]
impl CodeRewriter for ChatClient {
    async fn rewrite(&self, source: &str, directive: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![Message::system(directive), Message::user(source)],
        };

        let response = self.send_request(request).await?;

        let content = response
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .unwrap_or_default();

        let code = strip_code_fences(content);

        if code.is_empty() {
            return Err(Error::Rewrite(
                "Model returned an empty completion".to_string(),
            ));
        }

        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewriter::REWRITE_DIRECTIVE;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> RewriterConfig {
        RewriterConfig {
            api_key: SecretString::from("test-key"),
            base_url,
            model: "mistral-large-latest".to_string(),
            timeout_secs: 120,
        }
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "model": "mistral-large-latest",
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"total_tokens": 64}
        })
    }

    #[tokio::test]
    async fn test_rewrite_sends_directive_and_source() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_string_contains("expert Python programmer"))
            .and(body_string_contains("print(41 + 1)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("print(42)")))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(test_config(server.uri())).unwrap();
        let code = client
            .rewrite("print(41 + 1)", REWRITE_DIRECTIVE)
            .await
            .unwrap();

        assert_eq!(code, "print(42)");
    }

    #[tokio::test]
    async fn test_rewrite_strips_markdown_fences() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body("```python\nprint(42)\n```")),
            )
            .mount(&server)
            .await;

        let client = ChatClient::new(test_config(server.uri())).unwrap();
        let code = client.rewrite("print(41 + 1)", REWRITE_DIRECTIVE).await.unwrap();

        assert_eq!(code, "print(42)");
    }

    #[tokio::test]
    async fn test_provider_error_carries_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let client = ChatClient::new(test_config(server.uri())).unwrap();
        let err = client.rewrite("print(1)", REWRITE_DIRECTIVE).await.unwrap_err();

        match err {
            Error::Rewrite(msg) => assert!(msg.contains("401")),
            other => panic!("expected rewrite error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_completion_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("   ")))
            .mount(&server)
            .await;

        let client = ChatClient::new(test_config(server.uri())).unwrap();
        let err = client.rewrite("print(1)", REWRITE_DIRECTIVE).await.unwrap_err();

        assert!(matches!(err, Error::Rewrite(_)));
    }

    #[test]
    fn test_client_creation() {
        let config = test_config("https://api.mistral.ai/v1".to_string());
        let client = ChatClient::new(config);
        assert!(client.is_ok());
    }
}
