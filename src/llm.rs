use crate::config::{Credential, ProviderConfig};
use crate::error::CompletionError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Message in the context sent to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Produces one completion per call. Implementations hold no conversation state.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send `messages` (oldest first, the new prompt last) and return the reply text.
    async fn complete(&self, messages: &[LlmMessage]) -> Result<String, CompletionError>;
}

/// Request body for `POST /chat/completions`
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [LlmMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Client for OpenAI-compatible chat-completion endpoints
#[derive(Clone)]
pub struct OpenAiClient {
    provider: ProviderConfig,
    credential: Credential,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(provider: ProviderConfig, credential: Credential) -> Self {
        Self::with_http_client(provider, credential, reqwest::Client::new())
    }

    pub fn with_http_client(
        provider: ProviderConfig,
        credential: Credential,
        client: reqwest::Client,
    ) -> Self {
        Self {
            provider,
            credential,
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.provider.base_url.trim_end_matches('/'))
    }

    fn payload<'a>(&'a self, messages: &'a [LlmMessage]) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.provider.model,
            messages,
            max_tokens: self.provider.max_tokens,
            temperature: self.provider.temperature,
            top_p: self.provider.top_p,
            frequency_penalty: self.provider.frequency_penalty,
            presence_penalty: self.provider.presence_penalty,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[LlmMessage]) -> Result<String, CompletionError> {
        // Fails before any network traffic when the key is unusable.
        let api_key = self.credential.bearer()?;

        let url = self.endpoint();
        debug!(
            url = %url,
            model = %self.provider.model,
            messages = messages.len(),
            key = %api_key.redacted(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose())
            .json(&self.payload(messages))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(rejection(status, &body));
        }

        let content = parse_completion(&body)?;
        debug!(status = status.as_u16(), chars = content.len(), "completion received");
        Ok(content)
    }
}

/// Map a non-success response to `RemoteRejected`, preferring the provider's own message
fn rejection(status: StatusCode, body: &str) -> CompletionError {
    let provided = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| error.message)
        .filter(|message| !message.trim().is_empty());

    let message = provided.unwrap_or_else(|| {
        format!(
            "API request failed with status {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        )
    });

    CompletionError::RemoteRejected {
        status: status.as_u16(),
        message,
        body: body.to_string(),
    }
}

/// Extract `choices[0].message.content` from a success body
fn parse_completion(body: &str) -> Result<String, CompletionError> {
    let malformed = |message: String| CompletionError::Protocol {
        message,
        body: Some(body.to_string()),
    };

    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| malformed(format!("invalid completion body: {e}")))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| malformed("response contained no choices".to_string()))?;

    choice
        .message
        .content
        .ok_or_else(|| malformed("first choice has no message content".to_string()))
}
