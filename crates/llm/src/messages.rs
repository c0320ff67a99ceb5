use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::conversation::Conversation;

/// The author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single chat message.
///
/// A `null` content is accepted on the wire and treated as empty, so it gets filtered out
/// together with blank messages before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, deserialize_with = "nullable_string")]
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Identifies the provider and upstream model of a chat request.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSelector {
    /// Provider name, matched case-insensitively.
    pub provider: String,
    /// Upstream model identifier.
    pub name: String,
    /// Client-supplied credential. May be empty, in which case the configured key is used.
    #[serde(default = "empty_secret")]
    pub key: SecretString,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

/// Inbound chat request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub conversation: Conversation,
    pub model: ModelSelector,
    #[serde(default)]
    pub web_search: bool,
}

/// One unit of the outbound event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Content { content: String, model: String },
    Error { error: String },
}

impl StreamEvent {
    pub fn content(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self::Content {
            content: content.into(),
            model: model.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error { error: error.into() }
    }
}

/// Body of the model listing endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ModelsRequest {
    #[serde(default = "empty_secret")]
    pub(crate) api_key: SecretString,
}

/// Model listing response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub(crate) struct ModelsResponse {
    pub(crate) data: Vec<ModelId>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub(crate) struct ModelId {
    pub(crate) id: String,
}

impl FromIterator<String> for ModelsResponse {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            data: iter.into_iter().map(|id| ModelId { id }).collect(),
        }
    }
}

/// Body of the local model pull endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct PullRequest {
    pub(crate) model: String,
}
