use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Chat relay errors.
///
/// Errors raised before a stream opens become a non-streamed `{"detail": ...}` response.
/// Errors raised while a stream is open are rendered as a terminal in-band error frame
/// by the dispatcher, because the response status is already committed.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The requested provider is not part of the supported set.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Nothing was left to send after dropping empty and placeholder messages.
    #[error("Conversation has no messages after filtering")]
    EmptyConversation,

    /// Authentication failed (missing or invalid API key).
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Model not found at the provider.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Rate limit exceeded at the provider.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// The provider rejected the request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Provider API returned an error.
    #[error("Provider API error ({status}): {message}")]
    ProviderApiError { status: u16, message: String },

    /// The provider answered with something we could not parse.
    #[error("Malformed response from provider: {0}")]
    MalformedResponse(String),

    /// Network or connection error.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The provider has no model listing capability.
    #[error("Model listing is not supported for provider '{0}'")]
    ListingNotSupported(String),

    /// Internal server error.
    /// If Some(message), it came from a provider and can be shown.
    /// If None, it's an internal relay error and should not leak details.
    #[error("Internal server error")]
    InternalError(Option<String>),
}

impl LlmError {
    /// Get the appropriate HTTP status code for this error.
    ///
    /// Everything caused by client input or by an upstream provider is a client error;
    /// only failures inside the relay itself are server errors.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// The message shown to clients, never exposing relay internals.
    pub fn client_message(&self) -> String {
        match self {
            Self::InternalError(Some(provider_msg)) => provider_msg.clone(),
            Self::InternalError(None) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<JsonRejection> for LlmError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            Self::InternalError(Some(provider_msg)) => {
                log::error!("Provider returned internal error: {provider_msg}");
            }
            Self::InternalError(None) => {
                // Full error details are already logged where the error was created
                log::error!("Internal server error occurred");
            }
            _ => {
                log::debug!("Rejecting request ({}): {self}", status.as_u16());
            }
        }

        let error_response = ErrorResponse {
            detail: self.client_message(),
        };

        (status, Json(error_response)).into_response()
    }
}
