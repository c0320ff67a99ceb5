//! First-party model API with a session-style conversation model.
//!
//! History is rebuilt turn by turn: every earlier user turn is sent non-streamed against
//! the session accumulated so far, and only the final turn is streamed back. Time to first
//! byte therefore grows with the length of the conversation for this provider.

mod models;

use async_trait::async_trait;
use config::ProviderConfig;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use itertools::Itertools;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{
    conversation::Conversation,
    error::LlmError,
    messages::{Message, Role},
    provider::{
        DeltaStream, ErrorDetail, ProviderAdapter, ProviderKind, connection_error, error_from_response, http_client,
        token,
    },
    registry::RequestHandle,
};

const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const KIND: ProviderKind = ProviderKind::Gemini;
const API_KEY_HEADER: &str = "x-goog-api-key";

pub(crate) struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig) -> crate::Result<Self> {
        Ok(Self {
            client: http_client(KIND, config.timeout)?,
            base_url: config.base_url_or(DEFAULT_GEMINI_API_URL),
            api_key: config.api_key.clone(),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{model}:{method}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder, key: &SecretString) -> RequestBuilder {
        request.header(API_KEY_HEADER, key.expose_secret())
    }

    /// Replays the conversation history and returns the session to send the final turn with.
    ///
    /// `None` when the request was cancelled during the replay.
    async fn replay(
        &self,
        model: &str,
        conversation: &Conversation,
        key: &SecretString,
        handle: &RequestHandle,
    ) -> crate::Result<Option<Session>> {
        let mut session = Session::new(conversation);
        let mut turns = conversation
            .history()
            .iter()
            .filter((|message: &&Message| message.role != Role::System) as fn(&&Message) -> bool)
            .peekable();

        while let Some(message) = turns.next() {
            if message.role == Role::Assistant {
                session.push(Content::model(&message.content));
                continue;
            }

            session.push(Content::user(&message.content));

            if handle.is_cancelled() {
                return Ok(None);
            }

            let reply = self.generate(model, &session, key).await?;

            // The session keeps what the client saw, falling back to the fresh reply.
            match turns.next_if(|next| next.role == Role::Assistant) {
                Some(answer) => session.push(Content::model(&answer.content)),
                None if !reply.is_empty() => session.push(Content::model(&reply)),
                None => log::debug!("Replayed turn produced no text, leaving it unanswered"),
            }
        }

        if let Some(active) = conversation.active_turn() {
            session.push(Content::from(active));
        }

        Ok(Some(session))
    }

    /// One non-streamed turn against the session.
    async fn generate(&self, model: &str, session: &Session, key: &SecretString) -> crate::Result<String> {
        let url = self.model_url(model, "generateContent");

        let response = self
            .authorize(self.client.post(&url), key)
            .json(&session.request())
            .send()
            .await
            .map_err(|e| connection_error(KIND, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(KIND, response).await);
        }

        let text = response.text().await.map_err(|e| connection_error(KIND, e))?;

        let response: GenerateResponse = sonic_rs::from_str(&text).map_err(|e| {
            log::error!("Failed to parse gemini generateContent response: {e}");
            log::debug!("Raw response that failed to parse: {text}");
            LlmError::MalformedResponse("unexpected response from gemini".to_string())
        })?;

        response.into_text().map(Option::unwrap_or_default)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn stream(
        &self,
        model: &str,
        conversation: &Conversation,
        credential: &SecretString,
        handle: &RequestHandle,
    ) -> crate::Result<DeltaStream> {
        let key = token::required(KIND, credential, self.api_key.as_ref())?;

        let session = match self.replay(model, conversation, key, handle).await? {
            Some(session) if !handle.is_cancelled() => session,
            _ => {
                log::debug!("Request {} was cancelled while replaying gemini history", handle.id());
                return Ok(Box::pin(futures::stream::empty()));
            }
        };

        log::debug!("Streaming final turn to gemini with {} session entries", session.contents.len());

        let url = format!("{}?alt=sse", self.model_url(model, "streamGenerateContent"));

        let response = self
            .authorize(self.client.post(&url), key)
            .json(&session.request())
            .send()
            .await
            .map_err(|e| connection_error(KIND, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(KIND, response).await);
        }

        let deltas = response.bytes_stream().eventsource().filter_map(|event| async move {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("SSE parsing error in gemini stream: {e}");
                    return Some(Err(LlmError::ConnectionError(format!("gemini stream interrupted: {e}"))));
                }
            };

            if event.data.trim().is_empty() {
                return None;
            }

            match sonic_rs::from_str::<GenerateResponse>(&event.data) {
                Ok(chunk) => chunk.into_text().transpose(),
                Err(e) => {
                    log::warn!("Failed to parse gemini streaming chunk: {e}");
                    log::debug!("Raw chunk that failed to parse: {}", event.data);

                    Some(Err(LlmError::MalformedResponse("unexpected chunk from gemini".to_string())))
                }
            }
        });

        Ok(Box::pin(deltas))
    }

    async fn list_models(&self, credential: &SecretString) -> crate::Result<Vec<String>> {
        let key = token::required(KIND, credential, self.api_key.as_ref())?;
        let url = format!("{}/models", self.base_url);

        let response = self
            .authorize(self.client.get(&url), key)
            .query(&[("pageSize", "1000")])
            .send()
            .await
            .map_err(|e| connection_error(KIND, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(KIND, response).await);
        }

        let text = response.text().await.map_err(|e| connection_error(KIND, e))?;

        let catalog: ModelCatalog = sonic_rs::from_str(&text).map_err(|e| {
            log::error!("Failed to parse gemini models response: {e}");
            LlmError::MalformedResponse("unexpected model list from gemini".to_string())
        })?;

        let total = catalog.models.len();

        let names = catalog
            .models
            .into_iter()
            .filter(|model| model.supported_generation_methods.iter().any(|m| m == "generateContent"))
            .map(|model| match model.name.strip_prefix("models/") {
                Some(name) => name.to_string(),
                None => model.name,
            });

        let curated = models::curate(names);
        log::debug!("Curated {} of {total} gemini models", curated.len());

        Ok(curated)
    }
}

/// Accumulated chat state sent with every call.
#[derive(Debug, Default)]
struct Session {
    system_instruction: Option<String>,
    contents: Vec<Content>,
}

impl Session {
    fn new(conversation: &Conversation) -> Self {
        let system = conversation
            .history()
            .iter()
            .filter(|message| message.role == Role::System)
            .map(|message| message.content.as_str())
            .join("\n\n");

        Self {
            system_instruction: (!system.is_empty()).then_some(system),
            contents: Vec::new(),
        }
    }

    fn push(&mut self, content: Content) {
        self.contents.push(content);
    }

    fn request(&self) -> GenerateRequest<'_> {
        GenerateRequest {
            contents: &self.contents,
            system_instruction: self.system_instruction.as_deref().map(|text| SystemInstruction {
                parts: [Part { text: text.to_string() }],
            }),
            generation_config: GenerationConfig {
                response_mime_type: "text/plain",
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

impl Content {
    fn user(text: &str) -> Self {
        Self::with_role("user", text)
    }

    fn model(text: &str) -> Self {
        Self::with_role("model", text)
    }

    fn with_role(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part { text: text.to_string() }],
        }
    }
}

impl From<&Message> for Content {
    fn from(message: &Message) -> Self {
        match message.role {
            Role::Assistant => Content::model(&message.content),
            Role::User | Role::System => Content::user(&message.content),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: [Part; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate. `Ok(None)` when it carries no text.
    fn into_text(self) -> crate::Result<Option<String>> {
        if let Some(error) = self.error {
            return Err(LlmError::InternalError(Some(error.into_message())));
        }

        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|part| part.text).collect())
            .unwrap_or_default();

        Ok((!text.is_empty()).then_some(text))
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelCatalog {
    #[serde(default)]
    models: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}
