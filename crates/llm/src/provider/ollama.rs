//! Local model runner. Streams newline-delimited JSON instead of SSE.

use std::{io, pin::Pin};

use async_trait::async_trait;
use bytes::Bytes;
use config::ProviderConfig;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::{
    codec::{FramedRead, LinesCodec},
    io::StreamReader,
};

use crate::{
    conversation::Conversation,
    error::LlmError,
    messages::Message,
    provider::{DeltaStream, ProviderAdapter, ProviderKind, connection_error, error_from_response, http_client, token},
    registry::RequestHandle,
};

const DEFAULT_OLLAMA_API_URL: &str = "http://localhost:11434";
const KIND: ProviderKind = ProviderKind::Ollama;

/// Raw pull progress, passed through to the client unchanged.
pub(crate) type PullStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

pub(crate) struct OllamaProvider {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> crate::Result<Self> {
        Ok(Self {
            client: http_client(KIND, config.timeout)?,
            base_url: config.base_url_or(DEFAULT_OLLAMA_API_URL),
            api_key: config.api_key.clone(),
        })
    }

    /// Downloads a model into the local runner, streaming its progress lines.
    pub async fn pull(&self, model: &str) -> crate::Result<PullStream> {
        let url = format!("{}/api/pull", self.base_url);
        let body = PullBody { model, stream: true };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| connection_error(KIND, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(KIND, response).await);
        }

        log::info!("Pulling model '{model}' into the local runner");

        Ok(Box::pin(response.bytes_stream()))
    }

    /// The runner needs no key, but one is forwarded when present for runners behind a proxy.
    fn authorize(&self, request: RequestBuilder, credential: &SecretString) -> RequestBuilder {
        match token::optional(credential, self.api_key.as_ref()) {
            Some(key) => request.header(AUTHORIZATION, format!("Bearer {}", key.expose_secret())),
            None => request,
        }
    }
}

#[async_trait]
impl ProviderAdapter for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn stream(
        &self,
        model: &str,
        conversation: &Conversation,
        credential: &SecretString,
        _handle: &RequestHandle,
    ) -> crate::Result<DeltaStream> {
        let url = format!("{}/api/chat", self.base_url);

        let body = ChatBody {
            model,
            messages: conversation.messages(),
            stream: true,
        };

        let response = self
            .authorize(self.client.post(&url), credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| connection_error(KIND, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(KIND, response).await);
        }

        let reader = StreamReader::new(response.bytes_stream().map_err(io::Error::other));

        let deltas = FramedRead::new(reader, LinesCodec::new()).filter_map(|line| async move {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("Failed to read ollama stream: {e}");
                    return Some(Err(LlmError::ConnectionError(format!("ollama stream interrupted: {e}"))));
                }
            };

            if line.trim().is_empty() {
                return None;
            }

            match sonic_rs::from_str::<ChatChunk>(&line) {
                Ok(chunk) => chunk.into_delta().transpose(),
                Err(e) => {
                    log::warn!("Failed to parse ollama streaming chunk: {e}");
                    log::debug!("Raw chunk that failed to parse: {line}");

                    Some(Err(LlmError::MalformedResponse("unexpected chunk from ollama".to_string())))
                }
            }
        });

        Ok(Box::pin(deltas))
    }

    async fn list_models(&self, credential: &SecretString) -> crate::Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .authorize(self.client.get(&url), credential)
            .send()
            .await
            .map_err(|e| connection_error(KIND, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(KIND, response).await);
        }

        let text = response.text().await.map_err(|e| connection_error(KIND, e))?;

        let tags: TagList = sonic_rs::from_str(&text).map_err(|e| {
            log::error!("Failed to parse ollama tags response: {e}");
            LlmError::MalformedResponse("unexpected model list from ollama".to_string())
        })?;

        Ok(tags.models.into_iter().map(|model| model.name).collect())
    }
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Serialize)]
struct PullBody<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    error: Option<String>,
}

impl ChatChunk {
    fn into_delta(self) -> crate::Result<Option<String>> {
        if let Some(error) = self.error {
            return Err(LlmError::InternalError(Some(error)));
        }

        Ok(self
            .message
            .map(|message| message.content)
            .filter(|content| !content.is_empty()))
    }
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagList {
    models: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}
