//! Chat dispatch configuration for the upstream model providers.

use std::borrow::Cow;
use std::time::Duration;

use duration_str::{deserialize_duration, deserialize_option_duration};
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Chat dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Whether the chat endpoints are exposed.
    enabled: bool,

    /// The path where the chat and model endpoints will be mounted.
    pub path: Cow<'static, str>,

    /// Delay inserted after every emitted chunk to avoid flooding the transport.
    #[serde(deserialize_with = "deserialize_duration")]
    pub stream_pacing: Duration,

    /// Per-provider settings. Every provider is available even when its table is absent.
    pub providers: ProvidersConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Cow::Borrowed("/api"),
            stream_pacing: Duration::from_millis(10),
            providers: ProvidersConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Whether the chat endpoints are exposed.
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Settings for the fixed set of supported providers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvidersConfig {
    /// Local model runner (Ollama).
    pub ollama: ProviderConfig,
    /// Managed inference host (Hugging Face).
    pub huggingface: ProviderConfig,
    /// Aggregator gateway (OpenRouter).
    pub openrouter: ProviderConfig,
    /// Aggregator gateway (Groq).
    pub groq: ProviderConfig,
    /// First-party model API (Gemini).
    pub gemini: ProviderConfig,
}

/// Connection settings for a single provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Custom base URL for the provider API. Each provider has its own default.
    pub base_url: Option<Url>,

    /// Credential used when the client does not send one.
    pub api_key: Option<SecretString>,

    /// Upstream HTTP timeout. No timeout is applied when unset.
    #[serde(deserialize_with = "deserialize_option_duration")]
    pub timeout: Option<Duration>,
}

impl ProviderConfig {
    /// The configured base URL, or the given default, without a trailing slash.
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_ref()
            .map(Url::as_str)
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}
