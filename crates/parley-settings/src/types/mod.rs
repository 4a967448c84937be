//! Settings types.
//!
//! Every section deserializes with `#[serde(default)]`, so a settings file
//! only needs the keys it changes.

mod conversation;
mod service;

pub use conversation::{ChatSettings, ErrorPolicy, LogFormat, LoggingSettings};
pub use service::{ConnectionSettings, RouterSettings, ServiceSettings};

use parley_core::security::env_vars;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object, the shape of `~/.parley/settings.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    pub version: String,
    pub service: ServiceSettings,
    pub connections: ConnectionSettings,
    pub router: RouterSettings,
    pub chat: ChatSettings,
    pub logging: LoggingSettings,
}

impl Default for ParleySettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            service: ServiceSettings::default(),
            connections: ConnectionSettings::default(),
            router: RouterSettings::default(),
            chat: ChatSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ParleySettings {
    pub fn require_endpoint(&self) -> Result<&str> {
        required(&self.service.endpoint, env_vars::PROJECT_ENDPOINT)
    }

    pub fn require_model(&self) -> Result<&str> {
        required(&self.service.model_deployment, env_vars::MODEL_DEPLOYMENT_NAME)
    }

    pub fn require_web_search(&self) -> Result<&str> {
        required(&self.connections.web_search, env_vars::BING_CONNECTION_NAME)
    }

    pub fn require_orchestrator(&self) -> Result<&str> {
        required(&self.connections.orchestrator_agent_id, env_vars::ORCHESTRATOR_AGENT_ID)
    }

    pub fn require_router_endpoint(&self) -> Result<&str> {
        required(&self.router.endpoint, env_vars::OPENAI_ENDPOINT)
    }

    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.service.poll_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "service.pollIntervalMs must be positive".into(),
            ));
        }
        if self.chat.max_messages < 2 {
            return Err(SettingsError::InvalidValue(
                "chat.maxMessages must leave room for at least one reply".into(),
            ));
        }
        Ok(())
    }
}

fn required<'a>(value: &'a Option<String>, var: &'static str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(SettingsError::Missing(var))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = ParleySettings::default();
        assert_eq!(s.service.poll_interval_ms, 1_000);
        assert_eq!(s.chat.max_messages, 10);
        assert_eq!(s.chat.error_policy, ErrorPolicy::Abort);
        assert_eq!(s.router.deployment, "model-router");
        assert_eq!(s.logging.format, LogFormat::Pretty);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn missing_values_name_their_variable() {
        let s = ParleySettings::default();
        assert!(matches!(
            s.require_endpoint(),
            Err(SettingsError::Missing("AZURE_AI_PROJECT_ENDPOINT"))
        ));
        assert!(matches!(
            s.require_model(),
            Err(SettingsError::Missing("MODEL_DEPLOYMENT_NAME"))
        ));
        assert!(matches!(
            s.require_orchestrator(),
            Err(SettingsError::Missing("ORCHESTRATOR_AGENT_ID"))
        ));
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let mut s = ParleySettings::default();
        s.connections.web_search = Some("  ".into());
        assert!(matches!(
            s.require_web_search(),
            Err(SettingsError::Missing("BING_CONNECTION_NAME"))
        ));
        s.connections.web_search = Some("bing-conn".into());
        assert_eq!(s.require_web_search().unwrap(), "bing-conn");
    }

    #[test]
    fn validate_rejects_zero_poll_and_tiny_ceiling() {
        let mut s = ParleySettings::default();
        s.service.poll_interval_ms = 0;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));

        let mut s = ParleySettings::default();
        s.chat.max_messages = 1;
        assert!(s.validate().is_err());
    }
}
