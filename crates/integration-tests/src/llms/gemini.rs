use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};

use super::common::{Recorder, SpawnedProvider, TestLlmProvider, serve, sse_body};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// First-party model API with separate non-streamed and streamed generation.
pub struct GeminiMock {
    reply: String,
    deltas: Vec<String>,
    catalog: Vec<(String, Vec<String>)>,
    configured_key: Option<String>,
    generate_calls: Arc<AtomicUsize>,
}

impl Default for GeminiMock {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiMock {
    pub fn new() -> Self {
        let generate = || vec!["generateContent".to_string(), "countTokens".to_string()];

        Self {
            reply: "replayed".to_string(),
            deltas: vec!["Bon".to_string(), "jour".to_string()],
            catalog: vec![
                ("models/gemini-2.0-flash".to_string(), generate()),
                ("models/gemini-2.5-flash".to_string(), generate()),
                ("models/gemini-1.5-pro".to_string(), generate()),
                ("models/gemini-2.0-flash-001".to_string(), generate()),
                ("models/gemma-3-27b-it".to_string(), generate()),
                ("models/gemma-3-4b-it".to_string(), generate()),
                ("models/text-embedding-004".to_string(), vec!["embedContent".to_string()]),
            ],
            configured_key: Some("gemini-test-key".to_string()),
            generate_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Drops the configured key so requests must bring their own.
    pub fn without_configured_key(mut self) -> Self {
        self.configured_key = None;
        self
    }

    /// Counter of non-streamed generation calls, readable after the mock has been spawned.
    pub fn generate_calls(&self) -> Arc<AtomicUsize> {
        self.generate_calls.clone()
    }
}

struct MockState {
    mock: GeminiMock,
    recorder: Recorder,
}

impl TestLlmProvider for GeminiMock {
    async fn spawn(self) -> anyhow::Result<SpawnedProvider> {
        let recorder = Recorder::default();
        let api_key = self.configured_key.clone();

        let state = Arc::new(MockState {
            mock: self,
            recorder: recorder.clone(),
        });

        let app = Router::new()
            .route("/v1beta/models", get(list_models))
            .route("/v1beta/models/{action}", post(generate))
            .with_state(state);

        let address = serve(app).await?;

        Ok(SpawnedProvider {
            provider: "gemini",
            address,
            base_path: "/v1beta",
            api_key,
            recorder,
        })
    }
}

fn candidate(text: &str) -> Value {
    json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] }, "index": 0 }],
    })
}

async fn generate(
    State(state): State<Arc<MockState>>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some((model, method)) = action.split_once(':') else {
        return StatusCode::NOT_FOUND.into_response();
    };

    state
        .recorder
        .record(format!("/models/{model}:{method}"), &headers, API_KEY_HEADER, body);

    match method {
        "generateContent" => {
            state.mock.generate_calls.fetch_add(1, Ordering::SeqCst);
            Json(candidate(&state.mock.reply)).into_response()
        }
        "streamGenerateContent" => {
            let mut frames: Vec<String> = state.mock.deltas.iter().map(|delta| candidate(delta).to_string()).collect();
            frames.push(json!({ "candidates": [{ "finishReason": "STOP", "index": 0 }] }).to_string());

            ([(CONTENT_TYPE, "text/event-stream")], Body::from(sse_body(frames))).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn list_models(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Json<Value> {
    state.recorder.record("/models", &headers, API_KEY_HEADER, Value::Null);

    let models: Vec<Value> = state
        .mock
        .catalog
        .iter()
        .map(|(name, methods)| json!({ "name": name, "supportedGenerationMethods": methods }))
        .collect();

    Json(json!({ "models": models }))
}
