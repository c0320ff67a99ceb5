//! Providers speaking the OpenAI chat completions dialect: the managed inference host and
//! both aggregator gateways.

use async_trait::async_trait;
use config::ProviderConfig;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{
    conversation::Conversation,
    error::LlmError,
    messages::Message,
    provider::{
        DeltaStream, ErrorDetail, ProviderAdapter, ProviderKind, connection_error, error_from_response, http_client,
        token,
    },
    registry::RequestHandle,
};

const DEFAULT_HUGGINGFACE_API_URL: &str = "https://router.huggingface.co/v1";
const DEFAULT_OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_GROQ_API_URL: &str = "https://api.groq.com/openai/v1";

pub(crate) struct OpenAiCompatibleProvider {
    kind: ProviderKind,
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompatibleProvider {
    pub fn huggingface(config: &ProviderConfig) -> crate::Result<Self> {
        Self::new(ProviderKind::HuggingFace, DEFAULT_HUGGINGFACE_API_URL, config)
    }

    pub fn openrouter(config: &ProviderConfig) -> crate::Result<Self> {
        Self::new(ProviderKind::OpenRouter, DEFAULT_OPENROUTER_API_URL, config)
    }

    pub fn groq(config: &ProviderConfig) -> crate::Result<Self> {
        Self::new(ProviderKind::Groq, DEFAULT_GROQ_API_URL, config)
    }

    fn new(kind: ProviderKind, default_base_url: &str, config: &ProviderConfig) -> crate::Result<Self> {
        Ok(Self {
            kind,
            client: http_client(kind, config.timeout)?,
            base_url: config.base_url_or(default_base_url),
            api_key: config.api_key.clone(),
        })
    }

    /// The gateway catalog is public, everything else needs a key.
    fn listing_requires_key(&self) -> bool {
        self.kind != ProviderKind::OpenRouter
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn stream(
        &self,
        model: &str,
        conversation: &Conversation,
        credential: &SecretString,
        _handle: &RequestHandle,
    ) -> crate::Result<DeltaStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let key = token::required(self.kind, credential, self.api_key.as_ref())?;

        let body = CompletionRequest {
            model,
            messages: conversation.messages(),
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|e| connection_error(self.kind, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(self.kind, response).await);
        }

        let kind = self.kind;

        // `[DONE]` closes the stream. Everything after it is ignored.
        let deltas = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                let done = matches!(event, Ok(event) if event.data.trim() == "[DONE]");
                futures::future::ready(!done)
            })
            .filter_map(move |event| async move {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        log::warn!("SSE parsing error in {kind} stream: {e}");
                        return Some(Err(LlmError::ConnectionError(format!("{kind} stream interrupted: {e}"))));
                    }
                };

                if event.data.trim().is_empty() {
                    return None;
                }

                match sonic_rs::from_str::<CompletionChunk>(&event.data) {
                    Ok(chunk) => chunk.into_delta().transpose(),
                    Err(e) => {
                        log::warn!("Failed to parse {kind} streaming chunk: {e}");
                        log::debug!("Raw chunk that failed to parse: {}", event.data);

                        Some(Err(LlmError::MalformedResponse(format!(
                            "unexpected chunk from {kind}"
                        ))))
                    }
                }
            });

        Ok(Box::pin(deltas))
    }

    async fn list_models(&self, credential: &SecretString) -> crate::Result<Vec<String>> {
        if self.kind == ProviderKind::HuggingFace {
            return Err(LlmError::ListingNotSupported(self.kind.to_string()));
        }

        let url = format!("{}/models", self.base_url);
        let mut request = self.client.get(&url);

        if self.listing_requires_key() {
            let key = token::required(self.kind, credential, self.api_key.as_ref())?;
            request = request.header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()));
        } else if let Some(key) = token::optional(credential, self.api_key.as_ref()) {
            request = request.header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()));
        }

        let response = request.send().await.map_err(|e| connection_error(self.kind, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(self.kind, response).await);
        }

        let text = response.text().await.map_err(|e| connection_error(self.kind, e))?;

        let models: ModelList = sonic_rs::from_str(&text).map_err(|e| {
            log::error!("Failed to parse {} models list response: {e}", self.kind);
            log::debug!("Raw response that failed to parse: {text}");
            LlmError::MalformedResponse(format!("unexpected model list from {}", self.kind))
        })?;

        log::debug!("{} returned {} models", self.kind, models.data.len());

        Ok(models.data.into_iter().map(|model| model.id).collect())
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

impl CompletionChunk {
    /// The text of the first choice. `Ok(None)` for chunks without text, such as the
    /// role announcement or the final usage chunk.
    fn into_delta(self) -> crate::Result<Option<String>> {
        if let Some(error) = self.error {
            return Err(LlmError::InternalError(Some(error.into_message())));
        }

        Ok(self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty()))
    }
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}
