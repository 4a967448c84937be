//! Response shapes of the agent service REST API.
//!
//! Everything the service sends is decoded here and converted into the
//! `parley-core` model right away, so nothing past this module probes raw
//! JSON.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use parley_core::agent::{Agent, Connection, UploadedFile, VectorStore, VectorStoreStatus};
use parley_core::ids::{AgentId, FileId, MessageId, RunId, StepId, ThreadId, VectorStoreId};
use parley_core::messages::{Annotation, CitationSource, ContentBlock, Message, Role};
use parley_core::run::{LastError, Run, RunStatus, RunStep, StepKind, ToolCallSummary};

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct WireList<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub last_id: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct WireDeleted {
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct WireAgent {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created_at: i64,
}

impl From<WireAgent> for Agent {
    fn from(w: WireAgent) -> Self {
        Self {
            id: AgentId::from_raw(w.id),
            name: w.name.unwrap_or_default(),
            model: w.model,
            created_at: timestamp(w.created_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireThread {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub id: String,
    pub thread_id: String,
    pub role: Role,
    #[serde(default)]
    pub content: Vec<WireContent>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub assistant_id: Option<String>,
}

impl From<WireMessage> for Message {
    fn from(w: WireMessage) -> Self {
        Self {
            id: MessageId::from_raw(w.id),
            thread_id: ThreadId::from_raw(w.thread_id),
            role: w.role,
            content: w.content.into_iter().map(ContentBlock::from).collect(),
            created_at: timestamp(w.created_at),
            run_id: w.run_id.map(RunId::from_raw),
            agent_id: w.assistant_id.map(AgentId::from_raw),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireContent {
    Text { text: WireText },
    ImageFile { image_file: WireFileRef },
    #[serde(other)]
    Unknown,
}

impl From<WireContent> for ContentBlock {
    fn from(w: WireContent) -> Self {
        match w {
            WireContent::Text { text } => ContentBlock::Text {
                text: text.value,
                annotations: text.annotations.into_iter().filter_map(WireAnnotation::into_core).collect(),
            },
            WireContent::ImageFile { image_file } => ContentBlock::FileReference {
                file_id: FileId::from_raw(image_file.file_id),
            },
            WireContent::Unknown => ContentBlock::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireText {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<WireAnnotation>,
}

#[derive(Debug, Deserialize)]
pub struct WireFileRef {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WireUrlRef {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireAnnotation {
    FileCitation { text: String, file_citation: WireFileRef },
    FilePath { text: String, file_path: WireFileRef },
    UrlCitation { text: String, url_citation: WireUrlRef },
    #[serde(other)]
    Unknown,
}

impl WireAnnotation {
    fn into_core(self) -> Option<Annotation> {
        match self {
            Self::FileCitation { text, file_citation: file }
            | Self::FilePath { text, file_path: file } => Some(Annotation {
                marker: text,
                source: CitationSource::File { file_id: FileId::from_raw(file.file_id) },
            }),
            Self::UrlCitation { text, url_citation } => Some(Annotation {
                marker: text,
                source: CitationSource::Url {
                    url: url_citation.url,
                    title: url_citation.title,
                },
            }),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireLastError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct WireRun {
    pub id: String,
    pub thread_id: String,
    pub assistant_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<WireLastError>,
    #[serde(default)]
    pub created_at: i64,
}

impl From<WireRun> for Run {
    fn from(w: WireRun) -> Self {
        Self {
            id: RunId::from_raw(w.id),
            thread_id: ThreadId::from_raw(w.thread_id),
            agent_id: AgentId::from_raw(w.assistant_id),
            status: w.status,
            last_error: w.last_error.map(|e| LastError { code: e.code, message: e.message }),
            created_at: timestamp(w.created_at),
            steps: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireRunStep {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub status: RunStatus,
    #[serde(default)]
    pub step_details: Option<WireStepDetails>,
}

#[derive(Debug, Deserialize)]
pub struct WireStepDetails {
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
pub struct WireToolCall {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub function: Option<WireNamed>,
    #[serde(default)]
    pub connected_agent: Option<WireNamed>,
}

#[derive(Debug, Deserialize)]
pub struct WireNamed {
    #[serde(default)]
    pub name: Option<String>,
}

impl From<WireRunStep> for RunStep {
    fn from(w: WireRunStep) -> Self {
        let tool_calls = w
            .step_details
            .map(|d| d.tool_calls)
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCallSummary {
                name: call
                    .function
                    .or(call.connected_agent)
                    .and_then(|f| f.name),
                kind: call.kind,
            })
            .collect();
        Self {
            id: StepId::from_raw(w.id),
            kind: w.kind,
            status: w.status,
            tool_calls,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireFile {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub bytes: u64,
}

impl From<WireFile> for UploadedFile {
    fn from(w: WireFile) -> Self {
        Self {
            id: FileId::from_raw(w.id),
            filename: w.filename,
            bytes: w.bytes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireVectorStore {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: VectorStoreStatus,
    #[serde(default)]
    pub file_counts: WireFileCounts,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireFileCounts {
    #[serde(default)]
    pub total: u32,
}

impl From<WireVectorStore> for VectorStore {
    fn from(w: WireVectorStore) -> Self {
        Self {
            id: VectorStoreId::from_raw(w.id),
            name: w.name.unwrap_or_default(),
            status: w.status,
            file_count: w.file_counts.total,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireConnection {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl From<WireConnection> for Connection {
    fn from(w: WireConnection) -> Self {
        Self { id: w.id, name: w.name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_message_with_mixed_blocks() {
        let json = r#"{
            "id": "msg_1",
            "object": "thread.message",
            "created_at": 1736940000,
            "thread_id": "thread_1",
            "role": "assistant",
            "assistant_id": "asst_1",
            "run_id": "run_1",
            "content": [
                {"type": "image_file", "image_file": {"file_id": "assistant-img"}},
                {"type": "text", "text": {"value": "Yes, evening classes run Mon-Thu【4:0†source】.",
                    "annotations": [
                        {"type": "file_citation", "text": "【4:0†source】", "file_citation": {"file_id": "assistant-faq"}},
                        {"type": "something_new", "text": "?"}
                    ]}},
                {"type": "hologram", "hologram": {}}
            ]
        }"#;
        let wire: WireMessage = serde_json::from_str(json).unwrap();
        let msg = Message::from(wire);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.agent_id.as_ref().map(AgentId::as_str), Some("asst_1"));
        assert_eq!(msg.content.len(), 3);
        assert!(matches!(msg.content[0], ContentBlock::FileReference { .. }));
        assert_eq!(msg.content[2], ContentBlock::Unknown);
        assert_eq!(msg.first_text(), Some("Yes, evening classes run Mon-Thu【4:0†source】."));
        assert_eq!(msg.annotations().count(), 1);
        assert_eq!(msg.created_at.timestamp(), 1_736_940_000);
    }

    #[test]
    fn decode_failed_run_keeps_error_verbatim() {
        let json = r#"{
            "id": "run_9", "object": "thread.run", "thread_id": "thread_1",
            "assistant_id": "asst_1", "status": "failed", "created_at": 1,
            "last_error": {"code": "server_error", "message": "Sorry, something went wrong."}
        }"#;
        let run = Run::from(serde_json::from_str::<WireRun>(json).unwrap());
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(
            run.last_error,
            Some(LastError {
                code: "server_error".into(),
                message: "Sorry, something went wrong.".into()
            })
        );
    }

    #[test]
    fn decode_run_steps_with_tool_calls() {
        let json = r#"{"object": "list", "has_more": false, "data": [
            {"id": "step_1", "type": "tool_calls", "status": "completed",
             "step_details": {"type": "tool_calls", "tool_calls": [
                {"id": "call_1", "type": "bing_grounding", "bing_grounding": {"requesturl": "https://api.bing"}},
                {"id": "call_2", "type": "function", "function": {"name": "search_resources", "arguments": "{}"}},
                {"id": "call_3", "type": "connected_agent", "connected_agent": {"name": "quiz_agent"}}
             ]}},
            {"id": "step_2", "type": "message_creation", "status": "completed",
             "step_details": {"type": "message_creation", "message_creation": {"message_id": "msg_2"}}}
        ]}"#;
        let list: WireList<WireRunStep> = serde_json::from_str(json).unwrap();
        let steps: Vec<RunStep> = list.data.into_iter().map(RunStep::from).collect();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].kind, StepKind::ToolCalls);
        assert_eq!(steps[0].tool_calls.len(), 3);
        assert_eq!(steps[0].tool_calls[0].kind, "bing_grounding");
        assert_eq!(steps[0].tool_calls[0].name, None);
        assert_eq!(steps[0].tool_calls[1].name.as_deref(), Some("search_resources"));
        assert_eq!(steps[0].tool_calls[2].name.as_deref(), Some("quiz_agent"));
        assert!(steps[1].tool_calls.is_empty());
    }

    #[test]
    fn decode_vector_store() {
        let json = r#"{"id": "vs_1", "name": "agent_vectorstore", "status": "in_progress",
                       "file_counts": {"in_progress": 1, "completed": 0, "total": 1}}"#;
        let store = VectorStore::from(serde_json::from_str::<WireVectorStore>(json).unwrap());
        assert_eq!(store.status, VectorStoreStatus::InProgress);
        assert_eq!(store.file_count, 1);
    }
}
