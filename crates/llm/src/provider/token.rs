use secrecy::{ExposeSecret, SecretString};

use crate::{error::LlmError, provider::ProviderKind};

/// Picks the credential for an upstream call.
///
/// 1. The key sent by the client, when it is not blank
/// 2. Otherwise the key from the provider configuration
pub(super) fn optional<'a>(
    client_key: &'a SecretString,
    configured_key: Option<&'a SecretString>,
) -> Option<&'a SecretString> {
    if !client_key.expose_secret().trim().is_empty() {
        return Some(client_key);
    }

    configured_key.filter(|key| !key.expose_secret().trim().is_empty())
}

/// Like [`optional`], failing when neither key is available.
pub(super) fn required<'a>(
    kind: ProviderKind,
    client_key: &'a SecretString,
    configured_key: Option<&'a SecretString>,
) -> crate::Result<&'a SecretString> {
    optional(client_key, configured_key).ok_or_else(|| {
        LlmError::AuthenticationFailed(format!(
            "No API key was provided for {kind} and none is configured"
        ))
    })
}
