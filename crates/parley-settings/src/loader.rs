//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Load `.env` from the working directory into the process environment
//! 2. Start with compiled [`ParleySettings::default()`]
//! 3. If `~/.parley/settings.json` exists, deep-merge user values over defaults
//! 4. Apply environment variable overrides (highest priority)
//!
//! Nothing is logged about invalid overrides while loading; loading runs
//! before the subscriber exists. Problems are returned as
//! [`SettingsWarning`]s on [`LoadedSettings`] for the caller to log.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::fmt;
use std::path::{Path, PathBuf};

use parley_core::security::env_vars;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::credentials::from_env;
use crate::errors::Result;
use crate::types::ParleySettings;

pub const POLL_INTERVAL_VAR: &str = "PARLEY_POLL_INTERVAL_MS";
pub const RUN_TIMEOUT_VAR: &str = "PARLEY_RUN_TIMEOUT_MS";
pub const FETCH_STEPS_VAR: &str = "PARLEY_FETCH_STEPS";
pub const API_VERSION_VAR: &str = "PARLEY_API_VERSION";
pub const MAX_MESSAGES_VAR: &str = "PARLEY_MAX_MESSAGES";
pub const ERROR_POLICY_VAR: &str = "PARLEY_ERROR_POLICY";
pub const ROUTER_DEPLOYMENT_VAR: &str = "PARLEY_ROUTER_DEPLOYMENT";
pub const ROUTER_API_VERSION_VAR: &str = "MODEL_API_VERSION";
pub const LOG_LEVEL_VAR: &str = "PARLEY_LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "PARLEY_LOG_FORMAT";

/// A setting source that was skipped during loading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettingsWarning {
    /// An env override did not parse; the file/default value stays.
    InvalidEnv {
        key: String,
        value: String,
        kind: &'static str,
    },
    /// `.env` exists but could not be read.
    DotEnv(String),
}

impl SettingsWarning {
    pub fn key(&self) -> &str {
        match self {
            Self::InvalidEnv { key, .. } => key,
            Self::DotEnv(_) => ".env",
        }
    }

    /// Emit through `tracing` at warn level.
    pub fn log(&self) {
        match self {
            Self::InvalidEnv { key, value, kind } => {
                warn!(key = %key, value = %value, kind = *kind, "invalid env var, ignoring");
            }
            Self::DotEnv(error) => warn!(error = %error, "ignoring unreadable .env"),
        }
    }
}

impl fmt::Display for SettingsWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnv { key, value, kind } => {
                write!(f, "ignoring {key}={value:?}: not a valid {kind}")
            }
            Self::DotEnv(error) => write!(f, "ignoring unreadable .env: {error}"),
        }
    }
}

/// Settings plus whatever was skipped while producing them.
#[derive(Clone, Debug)]
pub struct LoadedSettings {
    pub settings: ParleySettings,
    pub warnings: Vec<SettingsWarning>,
}

impl LoadedSettings {
    /// Log every warning. Call once a subscriber is installed.
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            warning.log();
        }
    }
}

/// Resolve the path to the settings file (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley").join("settings.json")
}

/// Load `.env`, then settings from the default path with env var overrides.
pub fn load_settings() -> Result<LoadedSettings> {
    let dotenv = match dotenvy::dotenv() {
        Ok(_) => None,
        Err(e) if e.not_found() => None,
        Err(e) => Some(SettingsWarning::DotEnv(e.to_string())),
    };
    let mut loaded = load_settings_from_path(&settings_path())?;
    if let Some(warning) = dotenv {
        loaded.warnings.insert(0, warning);
    }
    Ok(loaded)
}

/// Load settings from a specific path with process env var overrides.
pub fn load_settings_from_path(path: &Path) -> Result<LoadedSettings> {
    load_settings_with(path, from_env)
}

/// Load settings from `path`, reading overrides through `lookup`.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<LoadedSettings> {
    let defaults = serde_json::to_value(ParleySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ParleySettings = serde_json::from_value(merged)?;
    let warnings = apply_env_overrides(&mut settings, &lookup);
    settings.validate()?;
    Ok(LoadedSettings { settings, warnings })
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides through `lookup`.
///
/// Invalid values are ignored (the file/default value stays) and returned.
pub fn apply_env_overrides(
    settings: &mut ParleySettings,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Vec<SettingsWarning> {
    let mut env = EnvReader {
        lookup,
        warnings: Vec::new(),
    };

    // ── Service ─────────────────────────────────────────────────────
    if let Some(v) = env.string(env_vars::PROJECT_ENDPOINT) {
        settings.service.endpoint = Some(v);
    }
    if let Some(v) = env.string(env_vars::MODEL_DEPLOYMENT_NAME) {
        settings.service.model_deployment = Some(v);
    }
    if let Some(v) = env.string(API_VERSION_VAR) {
        settings.service.api_version = v;
    }
    if let Some(v) = env.u64(POLL_INTERVAL_VAR, 50, 60_000) {
        settings.service.poll_interval_ms = v;
    }
    if let Some(v) = env.u64(RUN_TIMEOUT_VAR, 1_000, 86_400_000) {
        settings.service.run_timeout_ms = Some(v);
    }
    if let Some(v) = env.bool(FETCH_STEPS_VAR) {
        settings.service.fetch_steps = v;
    }

    // ── Connections ─────────────────────────────────────────────────
    if let Some(v) = env.string(env_vars::BING_CONNECTION_NAME) {
        settings.connections.web_search = Some(v);
    }
    if let Some(v) = env.string(env_vars::ORCHESTRATOR_AGENT_ID) {
        settings.connections.orchestrator_agent_id = Some(v);
    }

    // ── Router ──────────────────────────────────────────────────────
    if let Some(v) = env.string(env_vars::OPENAI_ENDPOINT) {
        settings.router.endpoint = Some(v.trim_end_matches('/').to_string());
    }
    if let Some(v) = env.string(ROUTER_DEPLOYMENT_VAR) {
        settings.router.deployment = v;
    }
    if let Some(v) = env.string(ROUTER_API_VERSION_VAR) {
        settings.router.api_version = v;
    }

    // ── Conversation ────────────────────────────────────────────────
    if let Some(v) = env.usize(MAX_MESSAGES_VAR, 2, 1_000) {
        settings.chat.max_messages = v;
    }
    if let Some(v) = env.enumeration(ERROR_POLICY_VAR) {
        settings.chat.error_policy = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string(LOG_LEVEL_VAR) {
        settings.logging.level = v;
    }
    if let Some(v) = env.enumeration(LOG_FORMAT_VAR) {
        settings.logging.format = v;
    }

    env.warnings
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

struct EnvReader<'a, F> {
    lookup: &'a F,
    warnings: Vec<SettingsWarning>,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T>(
        &mut self,
        name: &str,
        kind: &'static str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(val.trim());
        if result.is_none() {
            self.warnings.push(SettingsWarning::InvalidEnv {
                key: name.to_string(),
                value: val,
                kind,
            });
        }
        result
    }

    fn bool(&mut self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u64(&mut self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&mut self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }

    fn enumeration<T: DeserializeOwned>(&mut self, name: &str) -> Option<T> {
        self.parsed(name, "enum", |v| {
            serde_json::from_value(Value::String(v.to_lowercase())).ok()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use crate::types::{ErrorPolicy, LogFormat};
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_settings(json: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, json).unwrap();
        (dir, path)
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"service": {"pollIntervalMs": 1000, "apiVersion": "v1"}});
        let source = serde_json::json!({"service": {"pollIntervalMs": 250}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["service"]["pollIntervalMs"], 250);
        assert_eq!(merged["service"]["apiVersion"], "v1");
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3]}),
            serde_json::json!({"items": [4, 5]}),
        );
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(
            serde_json::json!({"a": 1, "b": 2}),
            serde_json::json!({"a": null}),
        );
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(
            serde_json::json!({"a": {"nested": true}}),
            serde_json::json!({"a": 42}),
        );
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_with ──────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = load_settings_with(Path::new("/nonexistent/settings.json"), no_env).unwrap().settings;
        assert_eq!(settings.service.poll_interval_ms, 1_000);
        assert_eq!(settings.chat.max_messages, 10);
    }

    #[test]
    fn file_overrides_defaults() {
        let (_dir, path) = write_settings(
            r#"{"service": {"pollIntervalMs": 500, "endpoint": "https://proj.example"},
                "chat": {"errorPolicy": "continue"}}"#,
        );
        let settings = load_settings_with(&path, no_env).unwrap().settings;
        assert_eq!(settings.service.poll_interval_ms, 500);
        assert_eq!(settings.service.endpoint.as_deref(), Some("https://proj.example"));
        assert_eq!(settings.service.api_version, "2025-05-01");
        assert_eq!(settings.chat.error_policy, ErrorPolicy::Continue);
        assert_eq!(settings.chat.max_messages, 10);
    }

    #[test]
    fn env_overrides_file() {
        let (_dir, path) = write_settings(
            r#"{"service": {"endpoint": "https://from-file", "modelDeployment": "gpt-4o"}}"#,
        );
        let settings = load_settings_with(
            &path,
            env(&[
                ("AZURE_AI_PROJECT_ENDPOINT", "https://from-env"),
                ("PARLEY_MAX_MESSAGES", "6"),
                ("PARLEY_LOG_FORMAT", "JSON"),
                ("AZURE_OPENAI_ENDPOINT", "https://router.example/"),
            ]),
        )
        .unwrap()
        .settings;
        assert_eq!(settings.service.endpoint.as_deref(), Some("https://from-env"));
        assert_eq!(settings.service.model_deployment.as_deref(), Some("gpt-4o"));
        assert_eq!(settings.chat.max_messages, 6);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.router.endpoint.as_deref(), Some("https://router.example"));
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let (_dir, path) = write_settings(r#"{"service": {"pollIntervalMs": 750}}"#);
        let loaded = load_settings_with(
            &path,
            env(&[
                ("PARLEY_POLL_INTERVAL_MS", "fast"),
                ("PARLEY_MAX_MESSAGES", "1"),
                ("PARLEY_ERROR_POLICY", "sometimes"),
                ("PARLEY_FETCH_STEPS", "maybe"),
            ]),
        )
        .unwrap();
        let settings = &loaded.settings;
        assert_eq!(settings.service.poll_interval_ms, 750);
        assert_eq!(settings.chat.max_messages, 10);
        assert_eq!(settings.chat.error_policy, ErrorPolicy::Abort);
        assert!(!settings.service.fetch_steps);

        let keys: Vec<&str> = loaded.warnings.iter().map(SettingsWarning::key).collect();
        assert_eq!(
            keys,
            [POLL_INTERVAL_VAR, FETCH_STEPS_VAR, MAX_MESSAGES_VAR, ERROR_POLICY_VAR]
        );
        assert_eq!(
            loaded.warnings[0].to_string(),
            "ignoring PARLEY_POLL_INTERVAL_MS=\"fast\": not a valid u64"
        );
    }

    #[test]
    fn valid_env_produces_no_warnings() {
        let loaded = load_settings_with(
            Path::new("/nonexistent/settings.json"),
            env(&[("PARLEY_POLL_INTERVAL_MS", "250"), ("PARLEY_LOG_FORMAT", "pretty")]),
        )
        .unwrap();
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.settings.service.poll_interval_ms, 250);
    }

    #[test]
    fn run_timeout_from_env() {
        let settings = load_settings_with(
            Path::new("/nonexistent/settings.json"),
            env(&[("PARLEY_RUN_TIMEOUT_MS", "300000"), ("PARLEY_FETCH_STEPS", "on")]),
        )
        .unwrap()
        .settings;
        assert_eq!(settings.service.run_timeout_ms, Some(300_000));
        assert!(settings.service.fetch_steps);
    }

    #[test]
    fn empty_env_value_does_not_clear_file_value() {
        let (_dir, path) = write_settings(r#"{"connections": {"webSearch": "bing-conn"}}"#);
        let settings = load_settings_with(&path, env(&[("BING_CONNECTION_NAME", "")])).unwrap().settings;
        assert_eq!(settings.connections.web_search.as_deref(), Some("bing-conn"));
    }

    #[test]
    fn invalid_json_is_error() {
        let (_dir, path) = write_settings("not valid json");
        let err = load_settings_with(&path, no_env).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn invalid_file_value_fails_validation() {
        let (_dir, path) = write_settings(r#"{"service": {"pollIntervalMs": 0}}"#);
        let err = load_settings_with(&path, no_env).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "ON"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u64_range("1000", 50, 60_000), Some(1000));
        assert_eq!(parse_u64_range("10", 50, 60_000), None);
        assert_eq!(parse_u64_range("abc", 50, 60_000), None);
        assert_eq!(parse_usize_range("2", 2, 1_000), Some(2));
        assert_eq!(parse_usize_range("1001", 2, 1_000), None);
    }

    #[test]
    fn settings_path_under_home() {
        assert!(settings_path().ends_with(".parley/settings.json"));
    }
}
