//! Multi-provider streaming chat.
//!
//! Accepts a unified chat request, hands it to one of the supported upstream providers and
//! streams the generated text back as server-sent events. Requests are tracked in a
//! [`RequestRegistry`] so that a disconnecting client stops its stream.

use axum::{
    Json, Router,
    body::Body,
    extract::{FromRequest, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
};

mod conversation;
mod dispatcher;
mod error;
mod messages;
mod prompt;
mod provider;
mod registry;
mod search;
mod server;
mod sse;

pub use conversation::Conversation;
pub use error::LlmError;
pub use messages::{ChatRequest, Message, ModelSelector, Role, StreamEvent};
pub use prompt::build_prompt;
pub use provider::ProviderKind;
pub use registry::{RequestGuard, RequestHandle, RequestRegistry};
pub use search::{CommandRetriever, ContextRetriever};
pub use sse::frame;

use messages::{ModelsRequest, ModelsResponse, PullRequest};
use server::LlmServer;

pub(crate) type Result<T> = std::result::Result<T, LlmError>;

/// Creates an axum router for the chat, model listing and model pull endpoints, mounted
/// under the configured llm path.
///
/// The registry is owned by the caller, which decides its lifetime.
pub async fn router(config: &config::Config, registry: RequestRegistry) -> anyhow::Result<Router> {
    let server = LlmServer::new(config, registry)
        .map_err(|e| anyhow::anyhow!("Failed to initialize chat server: {e}"))?;

    let routes = Router::new()
        .route("/chat", post(chat))
        .route("/models/{provider}", post(list_models))
        .route("/ollama/pull", post(pull_model))
        .with_state(server);

    Ok(Router::new().nest(&config.llm.path, routes))
}

/// A JSON request body. Malformed bodies are answered with `{"detail": ...}` like any other
/// client error.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(LlmError))]
struct Payload<T>(T);

/// Streams a chat completion as `text/event-stream`.
///
/// Failures before the stream opens are answered with `{"detail": ...}`. Later failures
/// arrive as a final `{"error": ...}` event.
async fn chat(State(server): State<LlmServer>, Payload(request): Payload<ChatRequest>) -> Result<impl IntoResponse> {
    let events = server.chat(request).await?;

    Ok(sse::into_response(events))
}

/// Lists the models available from a provider.
async fn list_models(
    State(server): State<LlmServer>,
    Path(provider): Path<String>,
    Payload(request): Payload<ModelsRequest>,
) -> Result<Json<ModelsResponse>> {
    let models = server.models(&provider, &request.api_key).await?;

    Ok(Json(models.into_iter().collect()))
}

/// Pulls a model into the local runner, passing its progress lines through.
async fn pull_model(State(server): State<LlmServer>, Payload(request): Payload<PullRequest>) -> Result<Response> {
    let progress = server.pull(&request.model).await?;

    let response = (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(progress),
    );

    Ok(response.into_response())
}
