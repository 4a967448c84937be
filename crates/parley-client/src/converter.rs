use serde_json::{json, Value};

use parley_core::agent::{AgentRole, ToolDefinition, ToolResources};
use parley_core::chat::{ChatMessage, ChatOptions};
use parley_core::ids::FileId;
use parley_core::messages::Role;

/// Request body for `POST /assistants`.
pub fn build_agent_body(role: &AgentRole) -> Value {
    let mut body = json!({
        "model": role.model,
        "name": role.name,
        "instructions": role.instructions,
    });

    if !role.tools.is_empty() {
        body["tools"] = Value::Array(role.tools.iter().map(convert_tool).collect());
    }

    if !role.tool_resources.is_empty() {
        body["tool_resources"] = convert_tool_resources(&role.tool_resources);
    }

    body
}

/// Service wire shape for a single tool definition.
pub fn convert_tool(tool: &ToolDefinition) -> Value {
    match tool {
        ToolDefinition::FileSearch => json!({"type": "file_search"}),
        ToolDefinition::CodeInterpreter => json!({"type": "code_interpreter"}),
        ToolDefinition::WebSearch { connection_id } => json!({
            "type": "bing_grounding",
            "bing_grounding": {
                "search_configurations": [{"connection_id": connection_id}]
            }
        }),
        ToolDefinition::Function {
            name,
            description,
            parameters,
        } => json!({
            "type": "function",
            "function": {
                "name": name,
                "description": description,
                "parameters": parameters,
            }
        }),
    }
}

fn convert_tool_resources(resources: &ToolResources) -> Value {
    json!({
        "file_search": {
            "vector_store_ids": resources.vector_store_ids,
        }
    })
}

/// Request body for `POST /threads/{id}/messages`.
pub fn build_message_body(role: Role, text: &str) -> Value {
    json!({
        "role": role.as_str(),
        "content": text,
    })
}

/// Request body for `POST /vector_stores`.
pub fn build_vector_store_body(name: &str, files: &[FileId]) -> Value {
    json!({
        "name": name,
        "file_ids": files,
    })
}

/// Request body for a streaming chat-completions call.
pub fn build_chat_body(messages: &[ChatMessage], options: &ChatOptions) -> Value {
    json!({
        "messages": messages,
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
        "top_p": options.top_p,
        "frequency_penalty": options.frequency_penalty,
        "presence_penalty": options.presence_penalty,
        "stream": true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ids::VectorStoreId;

    #[test]
    fn agent_body_minimal() {
        let role = AgentRole::new("decision_agent", "Write the plan.", "gpt-4o");
        let body = build_agent_body(&role);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["name"], "decision_agent");
        assert_eq!(body["instructions"], "Write the plan.");
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_resources").is_none());
    }

    #[test]
    fn agent_body_with_file_search() {
        let role = AgentRole::new("file-search-agent", "Answer from the data.", "gpt-4o")
            .with_file_search(VectorStoreId::from_raw("vs_abc"));
        let body = build_agent_body(&role);
        assert_eq!(body["tools"][0]["type"], "file_search");
        assert_eq!(body["tool_resources"]["file_search"]["vector_store_ids"][0], "vs_abc");
    }

    #[test]
    fn web_search_tool_shape() {
        let tool = convert_tool(&ToolDefinition::WebSearch { connection_id: "/conn/bing".into() });
        assert_eq!(tool["type"], "bing_grounding");
        assert_eq!(
            tool["bing_grounding"]["search_configurations"][0]["connection_id"],
            "/conn/bing"
        );
    }

    #[test]
    fn function_tool_shape() {
        let tool = convert_tool(&ToolDefinition::Function {
            name: "add".into(),
            description: "Add two numbers".into(),
            parameters: json!({"type": "object", "properties": {"a": {"type": "integer"}}}),
        });
        assert_eq!(tool["type"], "function");
        assert_eq!(tool["function"]["name"], "add");
        assert_eq!(tool["function"]["parameters"]["properties"]["a"]["type"], "integer");
    }

    #[test]
    fn message_body() {
        let body = build_message_body(Role::User, "Does Contoso offer evening classes?");
        assert_eq!(body["role"], "user");
        assert_eq!(body["content"], "Does Contoso offer evening classes?");
    }

    #[test]
    fn chat_body_streams() {
        let body = build_chat_body(&[ChatMessage::user("hi")], &ChatOptions::default());
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 8192);
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
