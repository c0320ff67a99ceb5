pub(crate) mod gemini;
pub(crate) mod ollama;
pub(crate) mod openai;
mod token;

use std::{fmt, pin::Pin, str::FromStr, time::Duration};

use async_trait::async_trait;
use futures::Stream;
use reqwest::{Client, StatusCode};
use secrecy::SecretString;
use serde::Deserialize;

use crate::{conversation::Conversation, error::LlmError, registry::RequestHandle};

/// Text deltas produced by an upstream provider, in arrival order.
///
/// Pinned and boxed so the dispatcher can drive every provider through the same type.
pub(crate) type DeltaStream = Pin<Box<dyn Stream<Item = crate::Result<String>> + Send>>;

/// The fixed set of upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Local model runner.
    Ollama,
    /// Managed inference host.
    HuggingFace,
    /// Aggregator gateway.
    OpenRouter,
    /// Aggregator gateway.
    Groq,
    /// First-party model API with a session-style conversation model.
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Ollama,
        ProviderKind::HuggingFace,
        ProviderKind::OpenRouter,
        ProviderKind::Groq,
        ProviderKind::Gemini,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::HuggingFace => "huggingface",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Groq => "groq",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LlmError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();

        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or(LlmError::UnsupportedProvider(name))
    }
}

/// One upstream provider behind the uniform streaming interface.
///
/// Adapters differ in how the conversation is shaped for the upstream API and how a
/// delta is pulled out of the native chunk format. Everything else (cancellation,
/// pacing, error framing) lives in the dispatcher.
///
/// Note for async_trait: the dispatcher holds adapters as trait objects, so the async
/// methods have to be boxed.
#[async_trait]
pub(crate) trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Opens a streamed completion of `conversation` with `model`.
    ///
    /// Errors returned here happen before the first delta. Errors inside the returned
    /// stream happen mid-response. Adapters making several upstream calls before the
    /// stream opens check `handle` between them and return an empty stream once the
    /// request is cancelled.
    async fn stream(
        &self,
        model: &str,
        conversation: &Conversation,
        credential: &SecretString,
        handle: &RequestHandle,
    ) -> crate::Result<DeltaStream>;

    /// Model identifiers available with the given credential.
    async fn list_models(&self, _credential: &SecretString) -> crate::Result<Vec<String>> {
        Err(LlmError::ListingNotSupported(self.kind().to_string()))
    }
}

/// Builds the HTTP client shared by all calls of one adapter.
pub(crate) fn http_client(kind: ProviderKind, timeout: Option<Duration>) -> crate::Result<Client> {
    let mut builder = Client::builder();

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    builder.build().map_err(|e| {
        log::error!("Failed to create HTTP client for {kind} provider: {e}");
        LlmError::InternalError(None)
    })
}

/// Maps a non-success upstream response to an error.
pub(crate) fn upstream_error(kind: ProviderKind, status: StatusCode, body: &str) -> LlmError {
    log::error!("{kind} API error ({status}): {body}");

    let message = error_message(body).unwrap_or_else(|| match body.trim() {
        "" => status.canonical_reason().unwrap_or("Unknown error").to_string(),
        body => body.to_string(),
    });

    match status.as_u16() {
        401 | 403 => LlmError::AuthenticationFailed(message),
        404 => LlmError::ModelNotFound(message),
        429 => LlmError::RateLimitExceeded(message),
        400 | 422 => LlmError::InvalidRequest(message),
        status => LlmError::ProviderApiError { status, message },
    }
}

/// Reads a failed response body and maps it with [`upstream_error`].
pub(crate) async fn error_from_response(kind: ProviderKind, response: reqwest::Response) -> LlmError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    upstream_error(kind, status, &body)
}

pub(crate) fn connection_error(kind: ProviderKind, e: reqwest::Error) -> LlmError {
    log::error!("Failed to reach {kind} provider: {e}");

    if e.is_timeout() {
        LlmError::ConnectionError(format!("Request to {kind} timed out"))
    } else {
        LlmError::ConnectionError(format!("Failed to send request to {kind}: {e}"))
    }
}

/// Upstream error payloads come in two shapes: `{"error": "..."}` and
/// `{"error": {"message": "..."}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub(crate) error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ErrorDetail {
    Text(String),
    Object { message: String },
}

impl ErrorDetail {
    pub(crate) fn into_message(self) -> String {
        match self {
            ErrorDetail::Text(message) | ErrorDetail::Object { message } => message,
        }
    }
}

fn error_message(body: &str) -> Option<String> {
    sonic_rs::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error.into_message())
}
