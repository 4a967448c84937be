use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, FileId, MessageId, RunId, ThreadId};

/// Who authored a thread message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a citation inside a text block points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CitationSource {
    File { file_id: FileId },
    Url { url: String, title: Option<String> },
}

/// A span of a text block that the service attributed to a source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// The literal marker inside the text, e.g. `【4:0†source】`.
    pub marker: String,
    pub source: CitationSource,
}

/// One block of message content.
///
/// Decoded once at the service boundary. Block kinds this crate does not
/// know become `Unknown` and are skipped by every text extractor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        annotations: Vec<Annotation>,
    },
    FileReference {
        file_id: FileId,
    },
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            annotations: Vec::new(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text.as_str()),
            Self::FileReference { .. } | Self::Unknown => None,
        }
    }
}

/// A message stored in a remote thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
}

impl Message {
    /// Value of the first text block, ignoring any other block kinds.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(ContentBlock::as_text)
    }

    pub fn has_text(&self) -> bool {
        self.first_text().is_some()
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Citations across all text blocks, in block order.
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.content.iter().flat_map(|block| match block {
            ContentBlock::Text { annotations, .. } => annotations.as_slice(),
            ContentBlock::FileReference { .. } | ContentBlock::Unknown => &[],
        })
    }
}

/// Listing order requested from the service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOrder {
    #[default]
    Asc,
    Desc,
}

impl ListOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Sort messages by creation time, oldest first.
///
/// The sort is stable: messages sharing a timestamp keep the order they had
/// in `raw`, since the service does not order within a timestamp.
pub fn order_messages(mut raw: Vec<Message>) -> Vec<Message> {
    raw.sort_by_key(|m| m.created_at);
    raw
}

/// [`order_messages`], then drop messages that carry no text block.
pub fn order_and_filter(raw: Vec<Message>) -> Vec<Message> {
    let mut ordered = order_messages(raw);
    ordered.retain(Message::has_text);
    ordered
}

/// The most recent assistant message in an already ordered sequence.
pub fn latest_assistant(ordered: &[Message]) -> Option<&Message> {
    ordered.iter().rev().find(|m| m.is_assistant())
}
