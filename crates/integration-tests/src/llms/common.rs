use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{Router, http::HeaderMap};
use indoc::formatdoc;
use tokio::net::TcpListener;

/// A mock upstream provider.
pub trait TestLlmProvider: Send + 'static {
    /// Starts the mock server.
    fn spawn(self) -> impl Future<Output = anyhow::Result<SpawnedProvider>> + Send;
}

/// A request as seen by a mock provider.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

/// Shared log of the requests a mock received.
#[derive(Debug, Clone, Default)]
pub(crate) struct Recorder(Arc<Mutex<Vec<RecordedRequest>>>);

impl Recorder {
    pub(crate) fn record(&self, path: impl Into<String>, headers: &HeaderMap, auth_header: &str, body: serde_json::Value) {
        let authorization = headers
            .get(auth_header)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        self.0.lock().unwrap().push(RecordedRequest {
            path: path.into(),
            authorization,
            body,
        });
    }

    fn snapshot(&self) -> Vec<RecordedRequest> {
        self.0.lock().unwrap().clone()
    }
}

/// A running mock provider.
pub struct SpawnedProvider {
    /// Config table name of the provider, e.g. `ollama`.
    pub provider: &'static str,
    pub address: SocketAddr,
    /// Path prefix the relay has to put in front of the provider API.
    pub base_path: &'static str,
    /// Key configured in the relay for this provider.
    pub api_key: Option<String>,
    pub(crate) recorder: Recorder,
}

impl SpawnedProvider {
    /// Every request the mock received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorder.snapshot()
    }

    /// Requests whose path ends with `suffix`.
    pub fn requests_to(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path.ends_with(suffix))
            .collect()
    }

    pub(crate) fn config_section(&self) -> String {
        let api_key = match &self.api_key {
            Some(key) => format!(r#"api_key = "{key}""#),
            None => String::new(),
        };

        formatdoc! {r#"

            [llm.providers.{provider}]
            base_url = "http://{address}{base_path}"
            {api_key}
        "#, provider = self.provider, address = self.address, base_path = self.base_path}
    }
}

/// Serves `app` on an ephemeral port.
pub(crate) async fn serve(app: Router) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Ok(address)
}

/// Joins SSE data frames into a response body.
pub(crate) fn sse_body<I, S>(frames: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    frames
        .into_iter()
        .map(|frame| format!("data: {}\n\n", frame.as_ref()))
        .collect()
}
