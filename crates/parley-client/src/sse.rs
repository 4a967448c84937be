use serde::Deserialize;

use parley_core::chat::ChatStreamEvent;
use parley_core::errors::ServiceError;

/// Sentinel payload closing a chat-completions stream.
const DONE: &str = "[DONE]";

/// State machine turning chat-completions chunks into [`ChatStreamEvent`]s.
///
/// Chunks without choices are heartbeats (or content-filter reports) and
/// are skipped. The serving model is reported once, from the first chunk
/// that carries a choice.
#[derive(Debug, Default)]
pub struct ChatChunkParser {
    model_reported: bool,
    finished: bool,
}

impl ChatChunkParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a finish reason or the `[DONE]` sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Parse one SSE payload and return zero or more events.
    pub fn parse_event(&mut self, event_type: &str, data: &str) -> Vec<ChatStreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        if event_type == "error" {
            events.push(ChatStreamEvent::Error { error: classify_error(data) });
            return events;
        }

        if data.trim() == DONE {
            self.finished = true;
            events.push(ChatStreamEvent::Finished { reason: "stop".into() });
            return events;
        }

        let chunk = match serde_json::from_str::<ChatChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable chat chunk");
                return events;
            }
        };

        if let Some(err) = chunk.error {
            events.push(ChatStreamEvent::Error {
                error: ServiceError::Server { status: 500, body: err.message },
            });
            return events;
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return events;
        };

        if !self.model_reported && !chunk.model.is_empty() {
            self.model_reported = true;
            events.push(ChatStreamEvent::Model { name: chunk.model });
        }

        if let Some(text) = choice.delta.and_then(|d| d.content) {
            if !text.is_empty() {
                events.push(ChatStreamEvent::Delta { text });
            }
        }

        if let Some(reason) = choice.finish_reason {
            self.finished = true;
            events.push(ChatStreamEvent::Finished { reason });
        }

        events
    }
}

fn classify_error(data: &str) -> ServiceError {
    match serde_json::from_str::<ErrorEnvelope>(data) {
        Ok(envelope) => match envelope.error.code.as_deref() {
            Some("429") | Some("rate_limit_exceeded") => ServiceError::RateLimited { retry_after: None },
            Some("401") | Some("invalid_api_key") => ServiceError::Authentication(envelope.error.message),
            _ => ServiceError::Server { status: 500, body: envelope.error.message },
        },
        Err(_) => ServiceError::StreamInterrupted(data.to_string()),
    }
}

/// Parse raw SSE text into (event_type, data) pairs.
///
/// Events without an `event:` line get the default type `message`. Multiple
/// `data:` lines of one event are joined with newlines; comments are ignored.
pub fn parse_sse_lines(raw: &str) -> Vec<(String, String)> {
    let mut events = Vec::new();
    let mut current_event = String::new();
    let mut current_data: Option<String> = None;

    for line in raw.lines() {
        if let Some(event) = line.strip_prefix("event:") {
            current_event = event.trim_start().to_string();
        } else if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            match &mut current_data {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(data);
                }
                None => current_data = Some(data.to_string()),
            }
        } else if line.is_empty() {
            if let Some(data) = current_data.take() {
                events.push((event_name(&current_event), data));
            }
            current_event.clear();
        }
    }

    // Trailing event without blank line
    if let Some(data) = current_data {
        events.push((event_name(&current_event), data));
    }

    events
}

fn event_name(raw: &str) -> String {
    if raw.is_empty() {
        "message".to_string()
    } else {
        raw.to_string()
    }
}

// --- Deserialization types for chat-completions chunks ---

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ErrorPayload>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    code: Option<String>,
    message: String,
}
