//! Group conversation and logging settings.

use serde::{Deserialize, Serialize};

/// What a group conversation does when one turn fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Record the failure in the history and move to the next participant.
    Continue,
    /// Stop the conversation.
    #[default]
    Abort,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// History ceiling for `plan`, counting the task message.
    pub max_messages: usize,
    pub error_policy: ErrorPolicy,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_messages: 10,
            error_policy: ErrorPolicy::Abort,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level directive. `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
    /// Warn-and-above records kept in memory for the log panel.
    pub buffer_capacity: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
            buffer_capacity: 200,
        }
    }
}
