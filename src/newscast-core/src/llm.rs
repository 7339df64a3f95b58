//! Language model access.
//!
//! The generator talks to [`LanguageModel`]; [`OpenAiModel`] implements it for
//! any OpenAI-compatible chat completions endpoint.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{NewscastError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Upper bound on the client's own retry of 5xx and 429 responses. Admits
/// the 1 s and 2 s waits, so at most three requests are sent.
const MAX_BACKOFF_ELAPSED: Duration = Duration::from_secs(5);

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the raw text of one completion for `prompt`.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Chat completions client with bounded retry on transport failures.
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    has_key: bool,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_attempts: u32,
}

impl OpenAiModel {
    pub fn new(config: &LlmConfig, api_base: &str, api_key: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NewscastError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        // async-openai retries server errors and rate limits itself; keep
        // that retry to the same 1 s, 2 s schedule used for transport errors.
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(INITIAL_BACKOFF)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(Some(MAX_BACKOFF_ELAPSED))
            .build();

        Ok(Self {
            client: Client::with_config(openai_config)
                .with_http_client(http_client)
                .with_backoff(backoff),
            has_key: !api_key.trim().is_empty(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_attempts: MAX_ATTEMPTS,
        })
    }

    async fn complete_once(&self, system: &str, prompt: &str) -> Result<String> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: system.to_string().into(),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: prompt.to_string().into(),
                name: None,
            }),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .max_completion_tokens(self.max_tokens)
            .n(1)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;
        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| NewscastError::Shape("completion has no message content".to_string()))
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        if !self.has_key {
            return Err(NewscastError::Auth(
                "OPENAI_API_KEY environment variable not set".to_string(),
            ));
        }

        let mut attempt = 0;
        loop {
            match self.complete_once(system, prompt).await {
                Ok(content) => {
                    debug!(chars = content.len(), "completion received");
                    return Ok(content);
                }
                Err(e) if is_retryable(&e) && attempt + 1 < self.max_attempts => {
                    // 1s, then 2s
                    let delay = INITIAL_BACKOFF * (1u32 << attempt);
                    warn!(attempt = attempt + 1, error = %e, ?delay, "completion failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Transport failures are retried here. 5xx and 429 responses arrive as
/// `ApiError` only after the client's own bounded retry gave up, so they are
/// not retried again.
fn is_retryable(err: &NewscastError) -> bool {
    matches!(err, NewscastError::OpenAI(OpenAIError::Reqwest(_))) || err.is_transient()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_auth_error() {
        let model = OpenAiModel::new(&LlmConfig::default(), DEFAULT_API_BASE, "").unwrap();
        let err = model.complete("system", "prompt").await.unwrap_err();
        assert!(matches!(err, NewscastError::Auth(_)));
    }

    fn completion_body(content: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1677652288,
            "model": "gpt-3.5-turbo-0613",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "logprobs": null,
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}
        })
    }

    #[tokio::test]
    async fn test_complete_returns_message_content() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body(serde_json::json!("[{\"speaker\":\"Alex\",\"text\":\"Hi\"}]"))),
            )
            .mount(&server)
            .await;

        let model = OpenAiModel::new(&LlmConfig::default(), &server.uri(), "test-key").unwrap();
        let content = model.complete("system", "prompt").await.unwrap();
        assert_eq!(content, "[{\"speaker\":\"Alex\",\"text\":\"Hi\"}]");
    }

    #[tokio::test]
    async fn test_missing_content_is_shape_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(serde_json::Value::Null)))
            .mount(&server)
            .await;

        let model = OpenAiModel::new(&LlmConfig::default(), &server.uri(), "test-key").unwrap();
        let err = model.complete("system", "prompt").await.unwrap_err();
        assert!(matches!(err, NewscastError::Shape(_)));
    }

    #[tokio::test]
    async fn test_persistent_server_error_gives_up_after_three_requests() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let model = OpenAiModel::new(&LlmConfig::default(), &server.uri(), "test-key").unwrap();
        let err = tokio::time::timeout(Duration::from_secs(20), model.complete("system", "prompt"))
            .await
            .expect("completion should give up well before the timeout")
            .unwrap_err();

        assert!(matches!(err, NewscastError::OpenAI(OpenAIError::ApiError(_))));
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
    }

    #[test]
    fn test_retry_classification() {
        assert!(is_retryable(&NewscastError::Transport("reset".into())));
        assert!(!is_retryable(&NewscastError::Shape("empty".into())));
        assert!(!is_retryable(&NewscastError::Auth("none".into())));
    }
}
