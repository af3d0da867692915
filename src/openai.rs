use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const PLACEHOLDER_API_KEY: &str = "your-api-key-here";

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("completion provider API key is not configured")]
    NotConfigured,
    #[error("request to completion provider failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion provider returned no choices")]
    EmptyResponse,
    #[error("completion provider timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: Url,
    model: String,
}

impl OpenAiProvider {
    pub fn new(
        api_key: Option<String>,
        base_url: &Url,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoint = base_url
            .join("chat/completions")
            .map_err(|err| ProviderError::Other(format!("invalid provider base url: {}", err)))?;

        Ok(Self {
            client,
            api_key: api_key.filter(|key| !key.is_empty() && key != PLACEHOLDER_API_KEY),
            endpoint,
            model,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::NotConfigured)?;

        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let res = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .inspect_err(|err| {
                tracing::error!(
                    "Error occurred in request to completion API: {:#?}",
                    err
                )
            })?
            .error_for_status()?;

        let completion = res
            .json::<ChatCompletionResponse>()
            .await
            .inspect_err(|err| {
                tracing::error!(
                    "Error occurred while deserialising completion response: {:#?}",
                    err
                )
            })?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ProviderError::EmptyResponse)
    }
}
