use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use parley_core::agent::{Agent, AgentRole, Connection, UploadedFile, VectorStore};
use parley_core::errors::ServiceError;
use parley_core::ids::{AgentId, FileId, RunId, ThreadId, VectorStoreId};
use parley_core::messages::{ListOrder, Message, Role};
use parley_core::run::{Run, RunStep};
use parley_core::security::Credential;
use parley_core::service::AgentService;

use crate::converter;
use crate::wire::{
    WireAgent, WireConnection, WireDeleted, WireFile, WireList, WireMessage, WireRun,
    WireRunStep, WireThread, WireVectorStore,
};

pub const DEFAULT_API_VERSION: &str = "2025-05-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const PAGE_LIMIT: u32 = 100;

/// [`AgentService`] over the project REST API.
///
/// One HTTP request per trait call (one per page for listings). Nothing is
/// retried: a failed request surfaces as a [`ServiceError`] right away.
pub struct HttpAgentService {
    client: Client,
    base_url: String,
    api_version: String,
    credential: Credential,
}

impl HttpAgentService {
    pub fn new(endpoint: &str, credential: Credential) -> Result<Self, ServiceError> {
        Self::with_api_version(endpoint, credential, DEFAULT_API_VERSION)
    }

    pub fn with_api_version(
        endpoint: &str,
        credential: Credential,
        api_version: &str,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
            credential,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .query(&[("api-version", self.api_version.as_str())])
            .header("accept", "application/json");

        match &self.credential {
            Credential::ApiKey(key) => req.header("api-key", key.0.expose_secret()),
            Credential::Bearer(token) => {
                req.header("Authorization", format!("Bearer {}", token.0.expose_secret()))
            }
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ServiceError> {
        let resp = req
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;
        let resp = check_status(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), ServiceError> {
        let deleted: WireDeleted = self.send(self.request(Method::DELETE, path)).await?;
        if !deleted.deleted {
            tracing::warn!(path, "service reported deleted=false");
        }
        Ok(())
    }

    /// Follow `after` cursors until the service reports no more pages.
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        order: Option<ListOrder>,
    ) -> Result<Vec<T>, ServiceError> {
        let mut items = Vec::new();
        let mut after: Option<String> = None;
        let limit = PAGE_LIMIT.to_string();

        loop {
            let mut req = self
                .request(Method::GET, path)
                .query(&[("limit", limit.as_str())]);
            if let Some(order) = order {
                req = req.query(&[("order", order.as_str())]);
            }
            if let Some(cursor) = &after {
                req = req.query(&[("after", cursor.as_str())]);
            }

            let page: WireList<T> = self.send(req).await?;
            let fetched = page.data.len();
            items.extend(page.data);

            match page.last_id {
                Some(last) if page.has_more && fetched > 0 => after = Some(last),
                _ => break,
            }
        }

        Ok(items)
    }
}

/// Map a non-success response to a [`ServiceError`], preferring the
/// service's own error message over the raw body.
async fn check_status(resp: Response) -> Result<Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    tracing::debug!(status = status.as_u16(), %message, "service returned an error");

    match ServiceError::from_status(status.as_u16(), message) {
        ServiceError::RateLimited { .. } => Err(ServiceError::RateLimited { retry_after }),
        other => Err(other),
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
impl AgentService for HttpAgentService {
    #[instrument(skip(self, role), fields(name = %role.name, model = %role.model))]
    async fn create_agent(&self, role: &AgentRole) -> Result<Agent, ServiceError> {
        let body = converter::build_agent_body(role);
        let agent: WireAgent = self.send(self.request(Method::POST, "/assistants").json(&body)).await?;
        Ok(agent.into())
    }

    #[instrument(skip(self))]
    async fn get_agent(&self, agent: &AgentId) -> Result<Agent, ServiceError> {
        let path = format!("/assistants/{agent}");
        let agent: WireAgent = self.send(self.request(Method::GET, &path)).await?;
        Ok(agent.into())
    }

    #[instrument(skip(self))]
    async fn list_agents(&self) -> Result<Vec<Agent>, ServiceError> {
        let agents: Vec<WireAgent> = self.list_all("/assistants", None).await?;
        Ok(agents.into_iter().map(Agent::from).collect())
    }

    #[instrument(skip(self))]
    async fn delete_agent(&self, agent: &AgentId) -> Result<(), ServiceError> {
        self.delete(&format!("/assistants/{agent}")).await
    }

    #[instrument(skip(self))]
    async fn create_thread(&self) -> Result<ThreadId, ServiceError> {
        let thread: WireThread = self
            .send(self.request(Method::POST, "/threads").json(&json!({})))
            .await?;
        Ok(ThreadId::from_raw(thread.id))
    }

    #[instrument(skip(self))]
    async fn delete_thread(&self, thread: &ThreadId) -> Result<(), ServiceError> {
        self.delete(&format!("/threads/{thread}")).await
    }

    #[instrument(skip(self, text), fields(chars = text.len()))]
    async fn create_message(
        &self,
        thread: &ThreadId,
        role: Role,
        text: &str,
    ) -> Result<Message, ServiceError> {
        let path = format!("/threads/{thread}/messages");
        let body = converter::build_message_body(role, text);
        let msg: WireMessage = self.send(self.request(Method::POST, &path).json(&body)).await?;
        Ok(msg.into())
    }

    #[instrument(skip(self))]
    async fn list_messages(
        &self,
        thread: &ThreadId,
        order: ListOrder,
    ) -> Result<Vec<Message>, ServiceError> {
        let path = format!("/threads/{thread}/messages");
        let messages: Vec<WireMessage> = self.list_all(&path, Some(order)).await?;
        Ok(messages.into_iter().map(Message::from).collect())
    }

    #[instrument(skip(self))]
    async fn create_run(&self, thread: &ThreadId, agent: &AgentId) -> Result<Run, ServiceError> {
        let path = format!("/threads/{thread}/runs");
        let body = json!({ "assistant_id": agent });
        let run: WireRun = self.send(self.request(Method::POST, &path).json(&body)).await?;
        Ok(run.into())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, ServiceError> {
        let path = format!("/threads/{thread}/runs/{run}");
        let run: WireRun = self.send(self.request(Method::GET, &path)).await?;
        Ok(run.into())
    }

    #[instrument(skip(self))]
    async fn cancel_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, ServiceError> {
        let path = format!("/threads/{thread}/runs/{run}/cancel");
        let run: WireRun = self.send(self.request(Method::POST, &path)).await?;
        Ok(run.into())
    }

    #[instrument(skip(self))]
    async fn list_run_steps(
        &self,
        thread: &ThreadId,
        run: &RunId,
    ) -> Result<Vec<RunStep>, ServiceError> {
        let path = format!("/threads/{thread}/runs/{run}/steps");
        let steps: Vec<WireRunStep> = self.list_all(&path, Some(ListOrder::Asc)).await?;
        Ok(steps.into_iter().map(RunStep::from).collect())
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadedFile, ServiceError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);
        let file: WireFile = self
            .send(self.request(Method::POST, "/files").multipart(form))
            .await?;
        Ok(file.into())
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, file: &FileId) -> Result<(), ServiceError> {
        self.delete(&format!("/files/{file}")).await
    }

    #[instrument(skip(self, files), fields(files = files.len()))]
    async fn create_vector_store(
        &self,
        name: &str,
        files: &[FileId],
    ) -> Result<VectorStore, ServiceError> {
        let body = converter::build_vector_store_body(name, files);
        let store: WireVectorStore = self
            .send(self.request(Method::POST, "/vector_stores").json(&body))
            .await?;
        Ok(store.into())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_vector_store(&self, store: &VectorStoreId) -> Result<VectorStore, ServiceError> {
        let path = format!("/vector_stores/{store}");
        let store: WireVectorStore = self.send(self.request(Method::GET, &path)).await?;
        Ok(store.into())
    }

    #[instrument(skip(self))]
    async fn delete_vector_store(&self, store: &VectorStoreId) -> Result<(), ServiceError> {
        self.delete(&format!("/vector_stores/{store}")).await
    }

    #[instrument(skip(self))]
    async fn get_connection(&self, name: &str) -> Result<Connection, ServiceError> {
        let path = format!("/connections/{name}");
        let conn: WireConnection = self.send(self.request(Method::GET, &path)).await?;
        Ok(conn.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::run::RunStatus;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> HttpAgentService {
        HttpAgentService::new(&server.uri(), Credential::api_key("test-key")).unwrap()
    }

    fn message_json(id: &str, role: &str, text: &str, created_at: i64) -> serde_json::Value {
        json!({
            "id": id, "object": "thread.message", "thread_id": "thread_1",
            "role": role, "created_at": created_at,
            "content": [{"type": "text", "text": {"value": text, "annotations": []}}]
        })
    }

    #[tokio::test]
    async fn create_thread_sends_api_key_and_version() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .and(query_param("api-version", DEFAULT_API_VERSION))
            .and(header("api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "thread_abc", "object": "thread"})))
            .expect(1)
            .mount(&server)
            .await;

        let thread = service(&server).create_thread().await.unwrap();
        assert_eq!(thread.as_str(), "thread_abc");
    }

    #[tokio::test]
    async fn bearer_credential_sets_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assistants/asst_1"))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "asst_1", "name": "orchestrator", "model": "gpt-4o", "created_at": 10
            })))
            .mount(&server)
            .await;

        let svc = HttpAgentService::new(&server.uri(), Credential::bearer("tok-1")).unwrap();
        let agent = svc.get_agent(&AgentId::from_raw("asst_1")).await.unwrap();
        assert_eq!(agent.name, "orchestrator");
    }

    #[tokio::test]
    async fn create_agent_posts_role() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assistants"))
            .and(body_partial_json(json!({"name": "Educator", "model": "gpt-4o"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "asst_new", "name": "Educator", "model": "gpt-4o", "created_at": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let role = AgentRole::new("Educator", "Review the plan.", "gpt-4o");
        let agent = service(&server).create_agent(&role).await.unwrap();
        assert_eq!(agent.id.as_str(), "asst_new");
    }

    #[tokio::test]
    async fn list_messages_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_1/messages"))
            .and(query_param("order", "asc"))
            .and(query_param_is_missing("after"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [message_json("msg_1", "user", "hi", 1), message_json("msg_2", "assistant", "hello", 2)],
                "first_id": "msg_1", "last_id": "msg_2", "has_more": true
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_1/messages"))
            .and(query_param("after", "msg_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [message_json("msg_3", "assistant", "more", 3)],
                "first_id": "msg_3", "last_id": "msg_3", "has_more": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let messages = service(&server)
            .list_messages(&ThreadId::from_raw("thread_1"), ListOrder::Asc)
            .await
            .unwrap();
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["msg_1", "msg_2", "msg_3"]);
    }

    #[tokio::test]
    async fn failed_run_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_1/runs/run_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "run_1", "thread_id": "thread_1", "assistant_id": "asst_1",
                "status": "failed", "created_at": 5,
                "last_error": {"code": "rate_limit_exceeded", "message": "Rate limit is exceeded."}
            })))
            .mount(&server)
            .await;

        let run = service(&server)
            .get_run(&ThreadId::from_raw("thread_1"), &RunId::from_raw("run_1"))
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.last_error.unwrap().message, "Rate limit is exceeded.");
    }

    #[tokio::test]
    async fn not_found_maps_to_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assistants/asst_missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "not_found", "message": "No assistant found with id 'asst_missing'."}
            })))
            .mount(&server)
            .await;

        let err = service(&server)
            .get_agent(&AgentId::from_raw("asst_missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(msg) if msg.contains("asst_missing")));
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads/thread_1/runs"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .expect(1)
            .mount(&server)
            .await;

        let err = service(&server)
            .create_run(&ThreadId::from_raw("thread_1"), &AgentId::from_raw("asst_1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(7)
        ));
    }

    #[tokio::test]
    async fn server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(1)
            .mount(&server)
            .await;

        let err = service(&server).create_thread().await.unwrap_err();
        assert!(matches!(err, ServiceError::Server { status: 503, .. }));
    }

    #[tokio::test]
    async fn delete_agent_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/assistants/asst_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "asst_1", "object": "assistant.deleted", "deleted": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        service(&server).delete_agent(&AgentId::from_raw("asst_1")).await.unwrap();
    }

    #[tokio::test]
    async fn upload_file_is_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "assistant-f1", "object": "file", "filename": "faq.md", "bytes": 12, "purpose": "assistants"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let file = service(&server)
            .upload_file("faq.md", b"# FAQ\nhello\n".to_vec())
            .await
            .unwrap();
        assert_eq!(file.id.as_str(), "assistant-f1");
        assert_eq!(file.bytes, 12);

        let received = server.received_requests().await.unwrap();
        let content_type = received[0]
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("multipart/form-data"), "got {content_type}");
    }

    #[tokio::test]
    async fn trailing_slash_endpoint_is_normalised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/connections/bing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "/subscriptions/x/connections/bing", "name": "bing"
            })))
            .mount(&server)
            .await;

        let svc = HttpAgentService::new(&format!("{}/", server.uri()), Credential::api_key("k")).unwrap();
        assert!(!svc.endpoint().ends_with('/'));
        let conn = svc.get_connection("bing").await.unwrap();
        assert_eq!(conn.id, "/subscriptions/x/connections/bing");
    }
}
