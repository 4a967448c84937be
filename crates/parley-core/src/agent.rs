use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, FileId, VectorStoreId};

/// A capability the service may invoke while executing a run.
///
/// Definitions are forwarded to the service as-is; nothing here executes them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    FileSearch,
    CodeInterpreter,
    /// Web search grounding through a named service connection.
    WebSearch { connection_id: String },
    Function {
        name: String,
        description: String,
        parameters: serde_json::Value,
    },
}

impl ToolDefinition {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileSearch => "file_search",
            Self::CodeInterpreter => "code_interpreter",
            Self::WebSearch { .. } => "web_search",
            Self::Function { .. } => "function",
        }
    }
}

/// Data the tools of an agent operate on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector_store_ids: Vec<VectorStoreId>,
}

impl ToolResources {
    pub fn is_empty(&self) -> bool {
        self.vector_store_ids.is_empty()
    }
}

/// Immutable description of an agent to create: name, instructions, tools
/// and model deployment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentRole {
    pub name: String,
    pub instructions: String,
    pub model: String,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub tool_resources: ToolResources,
}

impl AgentRole {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model: model.into(),
            tools: Vec::new(),
            tool_resources: ToolResources::default(),
        }
    }

    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    /// Attach a file-search tool backed by the given vector store.
    pub fn with_file_search(mut self, store: VectorStoreId) -> Self {
        if !self.tools.contains(&ToolDefinition::FileSearch) {
            self.tools.push(ToolDefinition::FileSearch);
        }
        self.tool_resources.vector_store_ids.push(store);
        self
    }
}

/// An agent that exists on the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreStatus {
    InProgress,
    Completed,
    Expired,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorStore {
    pub id: VectorStoreId,
    pub name: String,
    pub status: VectorStoreStatus,
    pub file_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: FileId,
    pub filename: String,
    pub bytes: u64,
}

/// A named service connection (for example a web search resource).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_builder_collects_tools() {
        let role = AgentRole::new("search-assistant", "Answer education questions.", "gpt-4o")
            .with_tool(ToolDefinition::WebSearch { connection_id: "conn-1".into() })
            .with_file_search(VectorStoreId::from_raw("vs_1"))
            .with_file_search(VectorStoreId::from_raw("vs_2"));
        assert_eq!(role.tools.len(), 2);
        assert_eq!(role.tool_resources.vector_store_ids.len(), 2);
        assert_eq!(role.tools[0].kind(), "web_search");
        assert_eq!(role.tools[1].kind(), "file_search");
    }

    #[test]
    fn tool_definition_tagging() {
        let json = serde_json::to_value(ToolDefinition::Function {
            name: "add".into(),
            description: "Add two numbers".into(),
            parameters: serde_json::json!({"type": "object"}),
        })
        .unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["name"], "add");
    }

    #[test]
    fn empty_resources() {
        assert!(ToolResources::default().is_empty());
    }
}
