use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Configuration for the external web search command that produces prompt context.
///
/// The command receives the user's query as its last argument and must print the
/// retrieved context to stdout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Whether requests with `web_search` set run the retrieval command.
    pub enabled: bool,
    /// Command and leading arguments, e.g. `["python", "web_search.py"]`.
    pub cmd: Vec<String>,
    /// Hard limit for a single retrieval run. The child process is killed afterwards.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cmd: Vec::new(),
            timeout: Duration::from_secs(300),
        }
    }
}
