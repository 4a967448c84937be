//! Secrets read from the environment. They never pass through the settings
//! file and are held as [`SecretString`] from the moment they are read.

use parley_core::security::{env_vars, Credential};
use secrecy::SecretString;

use crate::errors::{Result, SettingsError};

/// Credential for the agent service: an API key if set, else a bearer token.
pub fn project_credential(lookup: impl Fn(&str) -> Option<String>) -> Result<Credential> {
    if let Some(key) = non_empty(&lookup, env_vars::PROJECT_API_KEY) {
        return Ok(Credential::api_key(key));
    }
    if let Some(token) = non_empty(&lookup, env_vars::PROJECT_TOKEN) {
        return Ok(Credential::bearer(token));
    }
    Err(SettingsError::Missing(env_vars::PROJECT_API_KEY))
}

/// API key for the chat-completions router.
pub fn router_key(lookup: impl Fn(&str) -> Option<String>) -> Result<SecretString> {
    non_empty(&lookup, env_vars::OPENAI_KEY)
        .map(SecretString::from)
        .ok_or(SettingsError::Missing(env_vars::OPENAI_KEY))
}

/// Process environment lookup.
pub fn from_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.trim().is_empty())
}
