pub mod llms;

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use config::Config;
use llms::{SpawnedProvider, TestLlmProvider};
use server::ServeConfig;
use tokio::net::TcpListener;
use tokio::time::timeout;

static INIT: Once = Once::new();

fn init_crypto_provider() {
    INIT.call_once(|| {
        rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .expect("Failed to install default crypto provider");
    });
}

/// Test client for making HTTP requests to the test server
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    /// Create a new test client for the given base URL
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Send a POST request to the given path with JSON body
    pub async fn post<T: serde::Serialize>(&self, path: &str, body: &T) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
    }

    /// Starts a request with an arbitrary method, e.g. a CORS preflight.
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    /// Send a GET request to the given path
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }

    /// Posts a chat request and reads the whole event stream.
    pub async fn chat(&self, body: serde_json::Value) -> ChatResponse {
        let response = self.post("/api/chat", &body).await.unwrap();

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body = response.text().await.unwrap();

        ChatResponse {
            status,
            content_type,
            body,
        }
    }

    /// Lists models of a provider.
    pub async fn models(&self, provider: &str, api_key: &str) -> (u16, serde_json::Value) {
        let body = serde_json::json!({ "api_key": api_key });
        let response = self.post(&format!("/api/models/{provider}"), &body).await.unwrap();
        let status = response.status().as_u16();

        (status, response.json().await.unwrap())
    }
}

/// A fully read chat response.
#[derive(Debug)]
pub struct ChatResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl ChatResponse {
    /// The JSON payloads of all frames, in order.
    pub fn events(&self) -> Vec<serde_json::Value> {
        self.body
            .split("\n\n")
            .filter(|frame| !frame.is_empty())
            .map(|frame| {
                let data = frame.strip_prefix("data: ").expect("every frame is a data line");
                serde_json::from_str(data).unwrap()
            })
            .collect()
    }

    /// Concatenated `content` of all content frames.
    pub fn text(&self) -> String {
        self.events()
            .iter()
            .filter_map(|event| event.get("content").and_then(|content| content.as_str()))
            .collect()
    }
}

/// Builder for a relay instance wired to mock providers.
#[derive(Default)]
pub struct TestServerBuilder {
    providers: String,
}

impl TestServerBuilder {
    /// Starts a mock provider and points the relay at it.
    pub async fn spawn_provider<P: TestLlmProvider>(&mut self, provider: P) -> SpawnedProvider {
        let spawned = provider.spawn().await.unwrap();
        self.providers.push_str(&spawned.config_section());

        spawned
    }

    /// Starts the relay with `config_toml` plus the sections of all spawned providers.
    pub async fn build(self, config_toml: &str) -> TestServer {
        let config_toml = format!("{config_toml}\n{}", self.providers);
        TestServer::start(&config_toml).await
    }
}

/// Test server that manages the lifecycle of a server instance
pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn builder() -> TestServerBuilder {
        TestServerBuilder::default()
    }

    /// Start a new test server with the given TOML configuration
    pub async fn start(config_toml: &str) -> Self {
        init_crypto_provider();

        let config: Config = toml::from_str(config_toml).unwrap();
        config.validate().unwrap();

        // Find an available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let serve_config = ServeConfig {
            listen_address: address,
            config,
        };

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            // Drop the listener so the server can bind to the address
            drop(listener);

            let _ = tx.send(server::serve(serve_config).await);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;

        if let Ok(Err(e)) = rx.try_recv() {
            eprintln!("Server failed to start: {e}");
            std::process::exit(1);
        }

        let client = TestClient::new(format!("http://{address}"));

        // Verify the server is actually running by making a simple request
        let mut retries = 10;
        while retries > 0 {
            if timeout(Duration::from_millis(100), client.get("/")).await.is_ok() {
                break;
            }
            retries -= 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestServer {
            client,
            address,
            _handle: handle,
        }
    }
}
