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

use super::common::{Recorder, SpawnedProvider, TestLlmProvider, serve};

/// Local model runner speaking newline-delimited JSON.
pub struct OllamaMock {
    deltas: Vec<String>,
    models: Vec<String>,
    failure: Option<(StatusCode, String)>,
    stream_error: Option<(usize, String)>,
}

impl Default for OllamaMock {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaMock {
    pub fn new() -> Self {
        Self {
            deltas: vec!["Hel".to_string(), "lo".to_string()],
            models: vec!["llama3:latest".to_string(), "mistral:7b".to_string()],
            failure: None,
            stream_error: None,
        }
    }

    /// Content pieces streamed for every chat request.
    pub fn with_deltas<I, S>(mut self, deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deltas = deltas.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Rejects every chat request with `status` and `{"error": message}`.
    pub fn with_failure(mut self, status: StatusCode, message: impl Into<String>) -> Self {
        self.failure = Some((status, message.into()));
        self
    }

    /// Sends an error line after `after` deltas and ends the stream.
    pub fn with_stream_error(mut self, after: usize, message: impl Into<String>) -> Self {
        self.stream_error = Some((after, message.into()));
        self
    }
}

struct MockState {
    mock: OllamaMock,
    recorder: Recorder,
}

impl TestLlmProvider for OllamaMock {
    async fn spawn(self) -> anyhow::Result<SpawnedProvider> {
        let recorder = Recorder::default();

        let state = Arc::new(MockState {
            mock: self,
            recorder: recorder.clone(),
        });

        let app = Router::new()
            .route("/api/chat", post(chat))
            .route("/api/tags", get(tags))
            .route("/api/pull", post(pull))
            .with_state(state);

        let address = serve(app).await?;

        Ok(SpawnedProvider {
            provider: "ollama",
            address,
            base_path: "",
            api_key: None,
            recorder,
        })
    }
}

fn ndjson(lines: Vec<Value>) -> Response {
    let body: String = lines.into_iter().map(|line| format!("{line}\n")).collect();

    ([(CONTENT_TYPE, "application/x-ndjson")], Body::from(body)).into_response()
}

async fn chat(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.recorder.record("/api/chat", &headers, "authorization", body.clone());

    if let Some((status, message)) = &state.mock.failure {
        return (*status, Json(json!({ "error": message }))).into_response();
    }

    let model = body["model"].as_str().unwrap_or_default().to_string();
    let mut lines = Vec::new();

    for (i, delta) in state.mock.deltas.iter().enumerate() {
        if let Some((after, message)) = &state.mock.stream_error
            && *after == i
        {
            lines.push(json!({ "error": message }));
            return ndjson(lines);
        }

        lines.push(json!({
            "model": model,
            "message": { "role": "assistant", "content": delta },
            "done": false,
        }));
    }

    lines.push(json!({
        "model": model,
        "message": { "role": "assistant", "content": "" },
        "done": true,
    }));

    ndjson(lines)
}

async fn tags(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Json<Value> {
    state.recorder.record("/api/tags", &headers, "authorization", Value::Null);

    let models: Vec<Value> = state
        .mock
        .models
        .iter()
        .map(|name| json!({ "name": name, "model": name, "size": 4_661_224_676u64 }))
        .collect();

    Json(json!({ "models": models }))
}

async fn pull(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.recorder.record("/api/pull", &headers, "authorization", body.clone());

    if body["model"].as_str() == Some("missing") {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "pull model manifest: file does not exist" }))).into_response();
    }

    ndjson(vec![
        json!({ "status": "pulling manifest" }),
        json!({ "status": "downloading", "completed": 512, "total": 1024 }),
        json!({ "status": "success" }),
    ])
}
