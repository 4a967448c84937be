pub mod chat;
pub mod converter;
pub mod http;
pub mod sse;
pub mod wire;

pub mod mock;

pub use chat::AzureChatClient;
pub use http::HttpAgentService;
pub use mock::{MockAgentService, MockChatCompletions, MockChatResponse, MockRun};
