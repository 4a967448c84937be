//! # parley-core
//!
//! Shared vocabulary for the parley crates:
//!
//! - **Remote ids**: `AgentId`, `ThreadId`, `RunId`, ... as transparent newtypes
//! - **Messages**: thread messages with a tagged `ContentBlock` union and the
//!   ordering helpers (`order_messages`, `order_and_filter`)
//! - **Runs**: run status, run steps and the verbatim `LastError` payload
//! - **Agents**: `AgentRole` and the opaque `ToolDefinition`s passed to the service
//! - **Traits**: `AgentService` and `ChatCompletions`, the two remote seams
//! - **Errors**: `ServiceError` for transport and HTTP failures

pub mod agent;
pub mod chat;
pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod run;
pub mod security;
pub mod service;

pub use agent::{AgentRole, ToolDefinition};
pub use errors::ServiceError;
pub use messages::{order_and_filter, order_messages, ContentBlock, Message, Role};
pub use run::{LastError, Run, RunStatus};
pub use service::AgentService;
