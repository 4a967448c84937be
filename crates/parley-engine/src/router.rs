use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use parley_core::chat::{ChatCompletions, ChatMessage, ChatOptions, ChatStreamEvent};

use crate::error::RouterError;

/// Model name recorded when the stream never reports one.
pub const UNKNOWN_MODEL: &str = "unknown";

/// A streamed reply and the model that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutedReply {
    pub text: String,
    pub model: String,
}

/// How often one model served a reply.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelUsage {
    pub model: String,
    pub count: usize,
    pub percent: f64,
}

/// Multi-turn chat against a routing deployment, tracking which model
/// answered each turn.
pub struct RoutedChat {
    client: Arc<dyn ChatCompletions>,
    options: ChatOptions,
    system_prompt: String,
    history: Vec<ChatMessage>,
    models: Vec<String>,
}

impl RoutedChat {
    pub fn new(client: Arc<dyn ChatCompletions>, system_prompt: impl Into<String>, options: ChatOptions) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            client,
            options,
            history: vec![ChatMessage::system(system_prompt.clone())],
            system_prompt,
            models: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Models that served each reply, oldest first.
    pub fn model_history(&self) -> &[String] {
        &self.models
    }

    /// The last `n` models, newest first.
    pub fn recent_models(&self, n: usize) -> Vec<&str> {
        self.models.iter().rev().take(n).map(String::as_str).collect()
    }

    /// Drop the conversation, keeping the system prompt.
    pub fn clear(&mut self) {
        self.history = vec![ChatMessage::system(self.system_prompt.clone())];
        self.models.clear();
    }

    /// Send `text`, handing streamed chunks to `on_chunk` in arrival order.
    ///
    /// History is only extended when a non-empty reply arrives.
    #[instrument(skip_all, fields(deployment = %self.client.deployment(), turn = self.models.len() + 1))]
    pub async fn send<F>(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        mut on_chunk: F,
    ) -> Result<RoutedReply, RouterError>
    where
        F: FnMut(&str) + Send,
    {
        if text.trim().is_empty() {
            return Err(RouterError::EmptyInput);
        }

        let mut request = self.history.clone();
        request.push(ChatMessage::user(text));

        let mut stream = self.client.stream_chat(&request, &self.options).await?;
        let mut reply = String::new();
        let mut model: Option<String> = None;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Err(RouterError::Cancelled),
                event = stream.next() => event,
            };
            match event {
                Some(ChatStreamEvent::Model { name }) => {
                    if model.is_none() {
                        debug!(model = %name, "router selected model");
                        model = Some(name);
                    }
                }
                Some(ChatStreamEvent::Delta { text }) => {
                    on_chunk(&text);
                    reply.push_str(&text);
                }
                Some(ChatStreamEvent::Finished { reason }) => {
                    if reason != "stop" {
                        warn!(%reason, "reply finished early");
                    }
                    break;
                }
                Some(ChatStreamEvent::Error { error }) => return Err(error.into()),
                None => break,
            }
        }

        if reply.trim().is_empty() {
            return Err(RouterError::EmptyReply);
        }

        let model = model.unwrap_or_else(|| UNKNOWN_MODEL.to_string());
        self.history.push(ChatMessage::user(text));
        self.history.push(ChatMessage::assistant(reply.clone()));
        self.models.push(model.clone());

        Ok(RoutedReply { text: reply, model })
    }

    /// Share of replies per model, most used first.
    pub fn usage(&self) -> Vec<ModelUsage> {
        let total = self.models.len();
        if total == 0 {
            return Vec::new();
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for model in &self.models {
            *counts.entry(model.as_str()).or_default() += 1;
        }

        let mut usage: Vec<ModelUsage> = counts
            .into_iter()
            .map(|(model, count)| ModelUsage {
                model: model.to_string(),
                count,
                percent: count as f64 * 100.0 / total as f64,
            })
            .collect();
        usage.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.model.cmp(&b.model)));
        usage
    }
}
