use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};

use super::common::{Recorder, SpawnedProvider, TestLlmProvider, serve, sse_body};

/// Chat-completions compatible gateway, used for Hugging Face, OpenRouter and Groq.
pub struct OpenAiCompatMock {
    provider: &'static str,
    deltas: Vec<String>,
    models: Vec<String>,
    expected_key: Option<String>,
    configured_key: Option<String>,
    stream_error: Option<(usize, String)>,
}

impl OpenAiCompatMock {
    /// `provider` is the config table name: `huggingface`, `openrouter` or `groq`.
    pub fn new(provider: &'static str) -> Self {
        Self {
            provider,
            deltas: vec!["Hi".to_string(), " there".to_string()],
            models: vec!["llama-3.1-8b-instant".to_string(), "mixtral-8x7b-32768".to_string()],
            expected_key: None,
            configured_key: None,
            stream_error: None,
        }
    }

    pub fn with_deltas<I, S>(mut self, deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deltas = deltas.into_iter().map(Into::into).collect();
        self
    }

    /// Answers 401 unless the request carries `Bearer {key}`.
    pub fn with_expected_key(mut self, key: impl Into<String>) -> Self {
        self.expected_key = Some(key.into());
        self
    }

    /// Key written into the relay configuration for this provider.
    pub fn with_configured_key(mut self, key: impl Into<String>) -> Self {
        self.configured_key = Some(key.into());
        self
    }

    /// Sends an error chunk after `after` deltas.
    pub fn with_stream_error(mut self, after: usize, message: impl Into<String>) -> Self {
        self.stream_error = Some((after, message.into()));
        self
    }
}

struct MockState {
    mock: OpenAiCompatMock,
    recorder: Recorder,
}

impl MockState {
    fn rejects(&self, headers: &HeaderMap) -> Option<Response> {
        let expected = self.mock.expected_key.as_ref()?;

        let authorized = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == format!("Bearer {expected}"));

        if authorized {
            return None;
        }

        let body = json!({ "error": { "message": "Invalid API Key", "type": "invalid_request_error" } });

        Some((StatusCode::UNAUTHORIZED, Json(body)).into_response())
    }
}

impl TestLlmProvider for OpenAiCompatMock {
    async fn spawn(self) -> anyhow::Result<SpawnedProvider> {
        let recorder = Recorder::default();
        let provider = self.provider;
        let api_key = self.configured_key.clone();

        let state = Arc::new(MockState {
            mock: self,
            recorder: recorder.clone(),
        });

        let app = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .route("/v1/models", get(list_models))
            .with_state(state);

        let address = serve(app).await?;

        Ok(SpawnedProvider {
            provider,
            address,
            base_path: "/v1",
            api_key,
            recorder,
        })
    }
}

fn chunk(model: &str, content: &str) -> String {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{ "index": 0, "delta": { "content": content }, "finish_reason": null }],
    })
    .to_string()
}

async fn chat_completions(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state
        .recorder
        .record("/v1/chat/completions", &headers, "authorization", body.clone());

    if let Some(rejection) = state.rejects(&headers) {
        return rejection;
    }

    let model = body["model"].as_str().unwrap_or_default();

    // Role-only opening chunk, as real gateways send it.
    let mut frames = vec![
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion.chunk",
            "model": model,
            "choices": [{ "index": 0, "delta": { "role": "assistant" }, "finish_reason": null }],
        })
        .to_string(),
    ];

    for (i, delta) in state.mock.deltas.iter().enumerate() {
        if let Some((after, message)) = &state.mock.stream_error
            && *after == i
        {
            frames.push(json!({ "error": { "message": message } }).to_string());
            break;
        }

        frames.push(chunk(model, delta));
    }

    frames.push("[DONE]".to_string());

    ([(CONTENT_TYPE, "text/event-stream")], Body::from(sse_body(frames))).into_response()
}

async fn list_models(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.recorder.record("/v1/models", &headers, "authorization", Value::Null);

    if let Some(rejection) = state.rejects(&headers) {
        return rejection;
    }

    let data: Vec<Value> = state
        .mock
        .models
        .iter()
        .map(|id| json!({ "id": id, "object": "model", "owned_by": "test" }))
        .collect();

    Json(json!({ "object": "list", "data": data })).into_response()
}
