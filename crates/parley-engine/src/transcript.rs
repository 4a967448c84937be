use std::fmt::Write as _;
use std::path::Path;

use parley_core::ids::RunId;
use parley_core::messages::Message;

/// Who contributed a transcript entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Speaker {
    /// The task description that seeded the conversation.
    Task,
    Agent(String),
}

impl Speaker {
    pub fn label(&self) -> &str {
        match self {
            Self::Task => "task",
            Self::Agent(name) => name,
        }
    }

    pub fn is_agent(&self, name: &str) -> bool {
        matches!(self, Self::Agent(n) if n == name)
    }
}

/// One entry of a conversation history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub run_id: Option<RunId>,
    /// The turn failed; `text` holds the error message.
    pub is_error: bool,
    /// The run completed without an assistant reply; `text` holds the
    /// placeholder.
    pub no_response: bool,
}

impl TranscriptEntry {
    pub fn task(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Task,
            text: text.into(),
            run_id: None,
            is_error: false,
            no_response: false,
        }
    }

    pub fn reply(agent: impl Into<String>, text: impl Into<String>, run_id: RunId) -> Self {
        Self {
            speaker: Speaker::Agent(agent.into()),
            text: text.into(),
            run_id: Some(run_id),
            is_error: false,
            no_response: false,
        }
    }

    /// A completed turn that produced no assistant text.
    pub fn no_response(agent: impl Into<String>, placeholder: impl Into<String>, run_id: RunId) -> Self {
        Self {
            no_response: true,
            ..Self::reply(agent, placeholder, run_id)
        }
    }

    pub fn error(agent: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Agent(agent.into()),
            text: error.into(),
            run_id: None,
            is_error: true,
            no_response: false,
        }
    }
}

/// Plain-text rendering of a conversation, one block per entry.
pub fn render_history(history: &[TranscriptEntry]) -> String {
    let mut out = String::new();
    for entry in history {
        let marker = if entry.is_error { " (error)" } else { "" };
        let _ = writeln!(out, "[{}]{marker}", entry.speaker.label());
        let _ = writeln!(out, "{}", entry.text.trim_end());
        out.push('\n');
    }
    out
}

/// Plain-text rendering of thread messages as `role: text` lines.
///
/// Messages without a text block are skipped.
pub fn render_messages(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        if let Some(text) = message.first_text() {
            let _ = writeln!(out, "{}: {}", message.role, text.trim_end());
        }
    }
    out
}

/// Write the final artifact of a conversation to a text file, creating
/// parent directories as needed.
pub async fn write_artifact(path: &Path, artifact: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut body = artifact.trim_end().to_string();
    body.push('\n');
    tokio::fs::write(path, body).await
}
