use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A chat-completions message. Plain text only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Sampling options for a chat-completions request.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatOptions {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: 0.7,
            top_p: 0.95,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Events yielded by a streaming chat-completions response, in emission order.
#[derive(Clone, Debug)]
pub enum ChatStreamEvent {
    /// The model that served the request, reported once.
    Model { name: String },
    Delta { text: String },
    Finished { reason: String },
    Error { error: ServiceError },
}

pub type ChatStream = Pin<Box<dyn Stream<Item = ChatStreamEvent> + Send>>;

/// A streaming chat-completions endpoint.
#[async_trait]
pub trait ChatCompletions: Send + Sync {
    /// Deployment name requests are sent to.
    fn deployment(&self) -> &str;

    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatStream, ServiceError>;
}
