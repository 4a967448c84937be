use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::{Future, Stream};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{instrument, warn};

use parley_core::chat::{ChatCompletions, ChatMessage, ChatOptions, ChatStream, ChatStreamEvent};
use parley_core::errors::ServiceError;

use crate::converter;
use crate::sse::{self, ChatChunkParser};

pub const DEFAULT_CHAT_API_VERSION: &str = "2024-12-01-preview";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const SSE_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Streaming chat completions against an Azure OpenAI deployment.
pub struct AzureChatClient {
    client: Client,
    endpoint: String,
    deployment: String,
    api_version: String,
    api_key: SecretString,
}

impl AzureChatClient {
    pub fn new(
        endpoint: &str,
        deployment: &str,
        api_version: &str,
        api_key: SecretString,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            deployment: deployment.to_string(),
            api_version: api_version.to_string(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint, self.deployment
        )
    }
}

#[async_trait]
impl ChatCompletions for AzureChatClient {
    fn deployment(&self) -> &str {
        &self.deployment
    }

    #[instrument(skip(self, messages, options), fields(deployment = %self.deployment, messages = messages.len()))]
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatStream, ServiceError> {
        let body = converter::build_chat_body(messages, options);

        let resp = self
            .client
            .post(self.url())
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", self.api_key.expose_secret())
            .header("accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }

        Ok(Box::pin(SseStream::new(resp.bytes_stream())))
    }
}

/// Wraps a byte stream from reqwest and yields [`ChatStreamEvent`]s.
///
/// Emits an error if no data arrives within the idle window, and ends right
/// after the first `Finished` event.
struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    parser: ChatChunkParser,
    buffer: BytesMut,
    pending: VecDeque<ChatStreamEvent>,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    done: bool,
}

impl SseStream {
    fn new(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self::with_idle_timeout(byte_stream, SSE_IDLE_TIMEOUT)
    }

    fn with_idle_timeout(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser: ChatChunkParser::new(),
            buffer: BytesMut::new(),
            pending: VecDeque::new(),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            done: false,
        }
    }

    /// Parse one complete event block. Bytes are decoded only here, so a
    /// character split across network reads stays intact.
    fn feed(&mut self, block: &[u8]) {
        let text = match std::str::from_utf8(block) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "skipping SSE event with invalid UTF-8");
                return;
            }
        };
        for (event_type, data) in sse::parse_sse_lines(text) {
            self.pending.extend(self.parser.parse_event(&event_type, &data));
        }
    }

    fn next_block_end(&self) -> Option<usize> {
        self.buffer.windows(2).position(|w| w == b"\n\n").map(|pos| pos + 2)
    }

    fn next_pending(&mut self) -> Option<ChatStreamEvent> {
        let event = self.pending.pop_front()?;
        if matches!(event, ChatStreamEvent::Finished { .. } | ChatStreamEvent::Error { .. }) {
            self.done = true;
            self.pending.clear();
        }
        Some(event)
    }
}

impl Stream for SseStream {
    type Item = ChatStreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.next_pending() {
            return Poll::Ready(Some(event));
        }
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let new_deadline = tokio::time::Instant::now() + self.idle_duration;
                    self.idle_deadline.as_mut().reset(new_deadline);

                    self.buffer.extend_from_slice(&bytes);
                    while let Some(end) = self.next_block_end() {
                        let block = self.buffer.split_to(end);
                        self.feed(&block);
                    }

                    if let Some(event) = self.next_pending() {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(ChatStreamEvent::Error {
                        error: ServiceError::StreamInterrupted(e.to_string()),
                    }));
                }
                Poll::Ready(None) => {
                    if !self.buffer.is_empty() {
                        let remaining = self.buffer.split();
                        self.feed(&remaining);
                        if let Some(event) = self.next_pending() {
                            return Poll::Ready(Some(event));
                        }
                    }
                    self.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => {
                    if self.idle_deadline.as_mut().poll(cx).is_ready() {
                        self.done = true;
                        return Poll::Ready(Some(ChatStreamEvent::Error {
                            error: ServiceError::StreamInterrupted(format!(
                                "idle timeout after {}s",
                                self.idle_duration.as_secs()
                            )),
                        }));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}
