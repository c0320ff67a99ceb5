use std::time::Duration;

use duration_str::deserialize_option_duration;
use serde::{Deserialize, Deserializer};

/// Configuration for CORS (Cross-Origin Resource Sharing)
#[derive(Clone, Default, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// If false (or not defined), credentials are not allowed in requests
    pub allow_credentials: bool,
    /// Origins from which we allow requests
    pub allow_origins: Option<AllowedOrigins>,
    /// Maximum time between OPTIONS and the next request
    #[serde(deserialize_with = "deserialize_option_duration")]
    pub max_age: Option<Duration>,
}

/// Either every origin (`"*"`) or an explicit list of origins.
#[derive(Debug, Clone, PartialEq)]
pub enum AllowedOrigins {
    /// Any origin is allowed.
    Any,
    /// Only the listed origins are allowed.
    List(Vec<String>),
}

impl<'de> Deserialize<'de> for AllowedOrigins {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Single(String),
            List(Vec<String>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Single(value) if value == "*" => Ok(AllowedOrigins::Any),
            Raw::Single(value) => Ok(AllowedOrigins::List(vec![value])),
            Raw::List(values) => Ok(AllowedOrigins::List(values)),
        }
    }
}
