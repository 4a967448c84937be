use async_trait::async_trait;

use crate::agent::{Agent, AgentRole, Connection, UploadedFile, VectorStore};
use crate::errors::ServiceError;
use crate::ids::{AgentId, FileId, RunId, ThreadId, VectorStoreId};
use crate::messages::{ListOrder, Message, Role};
use crate::run::{Run, RunStep};

/// The hosted agent service.
///
/// Every method is one remote call (or, for listings, one call per page).
/// Implementations never retry and never wait on a run; waiting is the
/// caller's decision.
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn create_agent(&self, role: &AgentRole) -> Result<Agent, ServiceError>;
    async fn get_agent(&self, agent: &AgentId) -> Result<Agent, ServiceError>;
    async fn list_agents(&self) -> Result<Vec<Agent>, ServiceError>;
    async fn delete_agent(&self, agent: &AgentId) -> Result<(), ServiceError>;

    async fn create_thread(&self) -> Result<ThreadId, ServiceError>;
    async fn delete_thread(&self, thread: &ThreadId) -> Result<(), ServiceError>;

    async fn create_message(
        &self,
        thread: &ThreadId,
        role: Role,
        text: &str,
    ) -> Result<Message, ServiceError>;

    /// All messages of a thread, following pagination to the end.
    async fn list_messages(
        &self,
        thread: &ThreadId,
        order: ListOrder,
    ) -> Result<Vec<Message>, ServiceError>;

    /// Submit a run. Returns as soon as the service accepted it.
    async fn create_run(&self, thread: &ThreadId, agent: &AgentId) -> Result<Run, ServiceError>;
    async fn get_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, ServiceError>;
    async fn cancel_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, ServiceError>;
    async fn list_run_steps(
        &self,
        thread: &ThreadId,
        run: &RunId,
    ) -> Result<Vec<RunStep>, ServiceError>;

    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadedFile, ServiceError>;
    async fn delete_file(&self, file: &FileId) -> Result<(), ServiceError>;

    async fn create_vector_store(
        &self,
        name: &str,
        files: &[FileId],
    ) -> Result<VectorStore, ServiceError>;
    async fn get_vector_store(&self, store: &VectorStoreId) -> Result<VectorStore, ServiceError>;
    async fn delete_vector_store(&self, store: &VectorStoreId) -> Result<(), ServiceError>;

    /// Look up a named connection, e.g. the web search resource.
    async fn get_connection(&self, name: &str) -> Result<Connection, ServiceError>;
}
