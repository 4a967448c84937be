//! Remote endpoints: the agent service, its connections, and the chat router.

use std::time::Duration;

use parley_core::chat::ChatOptions;
use serde::{Deserialize, Serialize};

/// Agent service endpoint and run polling.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSettings {
    /// Project endpoint URL. Required by every agent-backed command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// `api-version` query parameter sent on every call.
    pub api_version: String,
    /// Model deployment agents are created against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_deployment: Option<String>,
    /// Delay between two run status polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Per-run deadline in milliseconds. Absent means no deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_ms: Option<u64>,
    /// Fetch run steps after a run completes.
    pub fetch_steps: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_version: "2025-05-01".to_string(),
            model_deployment: None,
            poll_interval_ms: 1_000,
            run_timeout_ms: None,
            fetch_steps: false,
        }
    }
}

impl ServiceSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }
}

/// Named connections and pre-existing remote objects.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Connection backing the web search tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search: Option<String>,
    /// Agent reused by `chat` instead of creating one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestrator_agent_id: Option<String>,
}

/// Chat-completions deployment that routes each request to a model.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouterSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub deployment: String,
    pub api_version: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        let options = ChatOptions::default();
        Self {
            endpoint: None,
            deployment: "model-router".to_string(),
            api_version: "2024-12-01-preview".to_string(),
            system_prompt: "You are a helpful assistant.".to_string(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            frequency_penalty: options.frequency_penalty,
            presence_penalty: options.presence_penalty,
        }
    }
}

impl RouterSettings {
    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
        }
    }
}
