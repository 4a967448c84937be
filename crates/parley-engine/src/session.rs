use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use parley_core::agent::{Agent, AgentRole, ToolDefinition, UploadedFile, VectorStore, VectorStoreStatus};
use parley_core::errors::ServiceError;
use parley_core::ids::{AgentId, FileId, ThreadId, VectorStoreId};
use parley_core::service::AgentService;

use crate::error::SessionError;

const VECTOR_STORE_POLL: Duration = Duration::from_secs(1);

/// A remote object created by a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    Agent(AgentId),
    Thread(ThreadId),
    File(FileId),
    VectorStore(VectorStoreId),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent(id) => write!(f, "agent {id}"),
            Self::Thread(id) => write!(f, "thread {id}"),
            Self::File(id) => write!(f, "file {id}"),
            Self::VectorStore(id) => write!(f, "vector store {id}"),
        }
    }
}

/// Result of [`AgentSession::close`].
#[derive(Debug, Default)]
pub struct CloseReport {
    pub deleted: Vec<Resource>,
    pub failed: Vec<(Resource, ServiceError)>,
}

impl CloseReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns every remote object created during one CLI session.
///
/// Construct once per session and call [`close`](Self::close) when done;
/// resources are deleted newest first. Agents adopted by id are not owned
/// and survive the session.
pub struct AgentSession {
    service: Arc<dyn AgentService>,
    ledger: Mutex<Vec<Resource>>,
}

impl AgentSession {
    pub fn new(service: Arc<dyn AgentService>) -> Self {
        Self {
            service,
            ledger: Mutex::new(Vec::new()),
        }
    }

    pub fn service(&self) -> &Arc<dyn AgentService> {
        &self.service
    }

    /// Resources still owned, oldest first.
    pub fn resources(&self) -> Vec<Resource> {
        self.ledger.lock().clone()
    }

    fn record(&self, resource: Resource) {
        self.ledger.lock().push(resource);
    }

    pub async fn create_agent(&self, role: &AgentRole) -> Result<Agent, SessionError> {
        let agent = self.service.create_agent(role).await?;
        info!(agent_id = %agent.id, name = %agent.name, "agent created");
        self.record(Resource::Agent(agent.id.clone()));
        Ok(agent)
    }

    /// Look up an existing agent. The session does not take ownership.
    pub async fn adopt_agent(&self, agent: &AgentId) -> Result<Agent, SessionError> {
        Ok(self.service.get_agent(agent).await?)
    }

    pub async fn create_thread(&self) -> Result<ThreadId, SessionError> {
        let thread = self.service.create_thread().await?;
        info!(thread_id = %thread, "thread created");
        self.record(Resource::Thread(thread.clone()));
        Ok(thread)
    }

    pub async fn upload_bytes(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadedFile, SessionError> {
        let file = self.service.upload_file(filename, bytes).await?;
        info!(file_id = %file.id, filename, bytes = file.bytes, "file uploaded");
        self.record(Resource::File(file.id.clone()));
        Ok(file)
    }

    pub async fn upload_path(&self, path: &Path) -> Result<UploadedFile, SessionError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        self.upload_bytes(&filename, bytes).await
    }

    /// Create a vector store over `files` and wait until indexing completes.
    #[instrument(skip(self, files, cancel), fields(files = files.len()))]
    pub async fn create_vector_store(
        &self,
        name: &str,
        files: &[FileId],
        cancel: &CancellationToken,
    ) -> Result<VectorStore, SessionError> {
        let mut store = self.service.create_vector_store(name, files).await?;
        self.record(Resource::VectorStore(store.id.clone()));

        while store.status == VectorStoreStatus::InProgress {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                _ = tokio::time::sleep(VECTOR_STORE_POLL) => {}
            }
            store = self.service.get_vector_store(&store.id).await?;
        }

        if store.status != VectorStoreStatus::Completed {
            return Err(SessionError::VectorStore {
                store: store.id,
                status: store.status,
            });
        }
        info!(store_id = %store.id, files = store.file_count, "vector store ready");
        Ok(store)
    }

    /// Web search tool bound to the named connection.
    pub async fn web_search_tool(&self, connection: &str) -> Result<ToolDefinition, SessionError> {
        let conn = self.service.get_connection(connection).await?;
        Ok(ToolDefinition::WebSearch { connection_id: conn.id })
    }

    /// Delete every owned resource, newest first. Individual failures are
    /// logged and reported; the remaining deletions still run.
    pub async fn close(&self) -> CloseReport {
        let resources: Vec<Resource> = std::mem::take(&mut *self.ledger.lock());
        let mut report = CloseReport::default();

        for resource in resources.into_iter().rev() {
            let result = match &resource {
                Resource::Agent(id) => self.service.delete_agent(id).await,
                Resource::Thread(id) => self.service.delete_thread(id).await,
                Resource::File(id) => self.service.delete_file(id).await,
                Resource::VectorStore(id) => self.service.delete_vector_store(id).await,
            };
            match result {
                Ok(()) => report.deleted.push(resource),
                Err(e) => {
                    warn!(resource = %resource, error = %e, "cleanup failed");
                    report.failed.push((resource, e));
                }
            }
        }

        info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "session closed"
        );
        report
    }
}
