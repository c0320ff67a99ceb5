use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use config::SearchConfig;
use tokio::process::Command;

/// Source of grounding text for a user query.
///
/// Retrieval never fails a chat request: every failure is reported as `None` and the
/// request continues with the plain prompt.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve_context(&self, query: &str) -> Option<String>;
}

/// Runs an external search program and reads the context from its stdout.
pub struct CommandRetriever {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRetriever {
    /// `None` when search is disabled or no command is configured.
    pub fn from_config(config: &SearchConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let (program, args) = config.cmd.split_first()?;

        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl ContextRetriever for CommandRetriever {
    async fn retrieve_context(&self, query: &str) -> Option<String> {
        let mut command = Command::new(&self.program);

        command
            .args(&self.args)
            .arg(query)
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                log::error!("Failed to start web search command '{}': {e}", self.program);
                return None;
            }
        };

        // Dropping the pending output future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                log::error!("Web search command failed: {e}");
                return None;
            }
            Err(_) => {
                log::warn!("Web search command timed out after {:?}", self.timeout);
                return None;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            log::warn!("Web search command exited with {}", output.status);
            log::debug!("Web search stdout: {stdout}");
            log::debug!("Web search stderr: {}", stderr.trim());
            return None;
        }

        if !stderr.trim().is_empty() {
            log::debug!("Web search stderr: {}", stderr.trim());
        }

        if stdout.is_empty() {
            log::debug!("Web search returned no context");
            return None;
        }

        log::debug!("Web search returned {} bytes of context", stdout.len());

        Some(stdout)
    }
}
