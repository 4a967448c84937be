//! In-memory doubles for [`AgentService`] and [`ChatCompletions`].
//!
//! Runs are scripted: each `create_run` pops the next [`MockRun`] and the
//! run advances one step per `get_run` poll. Timestamps come from a fake
//! clock so message ordering is deterministic.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use parking_lot::Mutex;

use parley_core::agent::{Agent, AgentRole, Connection, UploadedFile, VectorStore, VectorStoreStatus};
use parley_core::chat::{ChatCompletions, ChatMessage, ChatOptions, ChatStream, ChatStreamEvent};
use parley_core::errors::ServiceError;
use parley_core::ids::{AgentId, FileId, MessageId, RunId, StepId, ThreadId, VectorStoreId};
use parley_core::messages::{ContentBlock, ListOrder, Message, Role};
use parley_core::run::{LastError, Run, RunStatus, RunStep, StepKind};
use parley_core::service::AgentService;

const CLOCK_START: i64 = 1_700_000_000;

/// Scripted outcome of the next run.
#[derive(Clone, Debug)]
pub enum MockRun {
    /// Complete after `polls` in-progress polls, appending an assistant text message.
    Reply { text: String, polls: u32 },
    /// Like `Reply`, with arbitrary content blocks.
    Blocks { blocks: Vec<ContentBlock>, polls: u32 },
    /// Fail after `polls` polls with the given error payload.
    Fail { last_error: LastError, polls: u32 },
    /// Complete without adding any message.
    Silent,
    /// Stop in `requires_action`.
    RequiresAction,
    /// Stay `in_progress` until cancelled.
    Hang,
    /// Go straight to the given status with no message.
    End { status: RunStatus },
    /// `create_run` itself fails.
    Error(ServiceError),
}

impl MockRun {
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply { text: text.into(), polls: 0 }
    }

    pub fn fail(code: &str, message: &str) -> Self {
        Self::Fail {
            last_error: LastError { code: code.into(), message: message.into() },
            polls: 0,
        }
    }
}

struct RunState {
    run: Run,
    script: MockRun,
    polls_left: u32,
}

struct StoreState {
    store: VectorStore,
    polls_left: u32,
}

struct State {
    agents: Vec<Agent>,
    roles: Vec<AgentRole>,
    threads: HashMap<ThreadId, Vec<Message>>,
    runs: HashMap<RunId, RunState>,
    files: HashMap<FileId, UploadedFile>,
    stores: HashMap<VectorStoreId, StoreState>,
    connections: HashMap<String, Connection>,
    script: VecDeque<MockRun>,
    clock: i64,
    clock_step: i64,
    store_polls: u32,
    reverse_listing: bool,
    failing_deletes: HashSet<String>,
    message_error: Option<ServiceError>,
    calls: Vec<String>,
}

impl State {
    fn tick(&mut self) -> DateTime<Utc> {
        let now = DateTime::from_timestamp(self.clock, 0).unwrap_or_default();
        self.clock += self.clock_step;
        now
    }

    fn record(&mut self, call: &str, arg: &str) {
        self.calls.push(format!("{call}:{arg}"));
    }

    fn check_delete(&self, id: &str) -> Result<(), ServiceError> {
        if self.failing_deletes.contains(id) {
            return Err(ServiceError::Server {
                status: 500,
                body: format!("delete of {id} failed"),
            });
        }
        Ok(())
    }

    fn thread_mut(&mut self, thread: &ThreadId) -> Result<&mut Vec<Message>, ServiceError> {
        self.threads
            .get_mut(thread)
            .ok_or_else(|| ServiceError::NotFound(format!("thread {thread}")))
    }
}

/// In-memory [`AgentService`] with scripted runs.
pub struct MockAgentService {
    state: Mutex<State>,
}

impl Default for MockAgentService {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MockAgentService {
    pub fn new(script: Vec<MockRun>) -> Self {
        Self {
            state: Mutex::new(State {
                agents: Vec::new(),
                roles: Vec::new(),
                threads: HashMap::new(),
                runs: HashMap::new(),
                files: HashMap::new(),
                stores: HashMap::new(),
                connections: HashMap::new(),
                script: script.into(),
                clock: CLOCK_START,
                clock_step: 1,
                store_polls: 1,
                reverse_listing: false,
                failing_deletes: HashSet::new(),
                message_error: None,
                calls: Vec::new(),
            }),
        }
    }

    /// Queue more scripted runs.
    pub fn push_runs(&self, runs: impl IntoIterator<Item = MockRun>) {
        self.state.lock().script.extend(runs);
    }

    /// List messages in the opposite of the requested order.
    pub fn with_reversed_listing(self) -> Self {
        self.state.lock().reverse_listing = true;
        self
    }

    /// Seconds the fake clock advances per created object. Zero gives ties.
    pub fn with_clock_step(self, secs: i64) -> Self {
        self.state.lock().clock_step = secs;
        self
    }

    /// Polls a new vector store stays `in_progress` before completing.
    pub fn with_vector_store_polls(self, polls: u32) -> Self {
        self.state.lock().store_polls = polls;
        self
    }

    pub fn with_connection(self, name: &str, id: &str) -> Self {
        self.state.lock().connections.insert(
            name.to_string(),
            Connection { id: id.to_string(), name: name.to_string() },
        );
        self
    }

    /// Make the next `create_message` call fail with `error`.
    pub fn fail_next_message(&self, error: ServiceError) {
        self.state.lock().message_error = Some(error);
    }

    /// Make deletion of the resource with this id fail.
    pub fn fail_delete(&self, id: &str) {
        self.state.lock().failing_deletes.insert(id.to_string());
    }

    /// Register an agent that exists before the test starts.
    pub fn seed_agent(&self, id: &str, name: &str) -> AgentId {
        let mut state = self.state.lock();
        let created_at = state.tick();
        let agent_id = AgentId::from_raw(id);
        state.agents.push(Agent {
            id: agent_id.clone(),
            name: name.to_string(),
            model: "gpt-4o".into(),
            created_at,
        });
        agent_id
    }

    /// Append a message directly to a thread, bypassing the clock.
    pub fn push_message(&self, message: Message) {
        self.state
            .lock()
            .threads
            .entry(message.thread_id.clone())
            .or_default()
            .push(message);
    }

    /// Every call made so far, as `name:arg`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn calls_named(&self, name: &str) -> usize {
        let prefix = format!("{name}:");
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    /// Roles passed to `create_agent`, in call order.
    pub fn created_roles(&self) -> Vec<AgentRole> {
        self.state.lock().roles.clone()
    }

    pub fn agent_count(&self) -> usize {
        self.state.lock().agents.len()
    }

    pub fn thread_count(&self) -> usize {
        self.state.lock().threads.len()
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().files.len()
    }

    pub fn vector_store_count(&self) -> usize {
        self.state.lock().stores.len()
    }

    pub fn thread_messages(&self, thread: &ThreadId) -> Vec<Message> {
        self.state.lock().threads.get(thread).cloned().unwrap_or_default()
    }

    pub fn run_status(&self, run: &RunId) -> Option<RunStatus> {
        self.state.lock().runs.get(run).map(|r| r.run.status)
    }

    pub fn remaining_script(&self) -> usize {
        self.state.lock().script.len()
    }
}

fn advance(state: &mut State, run_id: &RunId) -> Result<Run, ServiceError> {
    let entry = state
        .runs
        .get_mut(run_id)
        .ok_or_else(|| ServiceError::NotFound(format!("run {run_id}")))?;

    let status = entry.run.status;
    if status.is_terminal() || status == RunStatus::RequiresAction {
        return Ok(entry.run.clone());
    }
    if entry.polls_left > 0 {
        entry.polls_left -= 1;
        entry.run.status = RunStatus::InProgress;
        return Ok(entry.run.clone());
    }

    let script = entry.script.clone();
    let thread_id = entry.run.thread_id.clone();
    let agent_id = entry.run.agent_id.clone();

    let (status, last_error, blocks) = match script {
        MockRun::Reply { text, .. } => (RunStatus::Completed, None, Some(vec![ContentBlock::text(text)])),
        MockRun::Blocks { blocks, .. } => (RunStatus::Completed, None, Some(blocks)),
        MockRun::Fail { last_error, .. } => (RunStatus::Failed, Some(last_error), None),
        MockRun::Silent => (RunStatus::Completed, None, None),
        MockRun::RequiresAction => (RunStatus::RequiresAction, None, None),
        MockRun::Hang => (RunStatus::InProgress, None, None),
        MockRun::End { status } => (status, None, None),
        MockRun::Error(e) => return Err(e),
    };

    if let Some(content) = blocks {
        let created_at = state.tick();
        let message = Message {
            id: MessageId::new(),
            thread_id: thread_id.clone(),
            role: Role::Assistant,
            content,
            created_at,
            run_id: Some(run_id.clone()),
            agent_id: Some(agent_id),
        };
        state.thread_mut(&thread_id)?.push(message);
    }

    let entry = state
        .runs
        .get_mut(run_id)
        .ok_or_else(|| ServiceError::NotFound(format!("run {run_id}")))?;
    entry.run.status = status;
    entry.run.last_error = last_error;
    Ok(entry.run.clone())
}

#[async_trait]
impl AgentService for MockAgentService {
    async fn create_agent(&self, role: &AgentRole) -> Result<Agent, ServiceError> {
        let mut state = self.state.lock();
        state.record("create_agent", &role.name);
        let created_at = state.tick();
        let agent = Agent {
            id: AgentId::new(),
            name: role.name.clone(),
            model: role.model.clone(),
            created_at,
        };
        state.agents.push(agent.clone());
        state.roles.push(role.clone());
        Ok(agent)
    }

    async fn get_agent(&self, agent: &AgentId) -> Result<Agent, ServiceError> {
        let state = self.state.lock();
        state
            .agents
            .iter()
            .find(|a| &a.id == agent)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("agent {agent}")))
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, ServiceError> {
        Ok(self.state.lock().agents.clone())
    }

    async fn delete_agent(&self, agent: &AgentId) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        state.record("delete_agent", agent.as_str());
        state.check_delete(agent.as_str())?;
        let before = state.agents.len();
        state.agents.retain(|a| &a.id != agent);
        if state.agents.len() == before {
            return Err(ServiceError::NotFound(format!("agent {agent}")));
        }
        Ok(())
    }

    async fn create_thread(&self) -> Result<ThreadId, ServiceError> {
        let mut state = self.state.lock();
        let thread = ThreadId::new();
        state.record("create_thread", thread.as_str());
        state.threads.insert(thread.clone(), Vec::new());
        Ok(thread)
    }

    async fn delete_thread(&self, thread: &ThreadId) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        state.record("delete_thread", thread.as_str());
        state.check_delete(thread.as_str())?;
        state
            .threads
            .remove(thread)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("thread {thread}")))
    }

    async fn create_message(
        &self,
        thread: &ThreadId,
        role: Role,
        text: &str,
    ) -> Result<Message, ServiceError> {
        let mut state = self.state.lock();
        state.record("create_message", thread.as_str());
        if let Some(error) = state.message_error.take() {
            return Err(error);
        }
        let created_at = state.tick();
        let message = Message {
            id: MessageId::new(),
            thread_id: thread.clone(),
            role,
            content: vec![ContentBlock::text(text)],
            created_at,
            run_id: None,
            agent_id: None,
        };
        state.thread_mut(thread)?.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        thread: &ThreadId,
        order: ListOrder,
    ) -> Result<Vec<Message>, ServiceError> {
        let mut state = self.state.lock();
        state.record("list_messages", thread.as_str());
        let reverse = state.reverse_listing;
        let mut messages = state.thread_mut(thread)?.clone();
        let descending = matches!(order, ListOrder::Desc) != reverse;
        if descending {
            messages.reverse();
        }
        Ok(messages)
    }

    async fn create_run(&self, thread: &ThreadId, agent: &AgentId) -> Result<Run, ServiceError> {
        let mut state = self.state.lock();
        state.record("create_run", agent.as_str());
        if !state.threads.contains_key(thread) {
            return Err(ServiceError::NotFound(format!("thread {thread}")));
        }
        if !state.agents.iter().any(|a| &a.id == agent) {
            return Err(ServiceError::NotFound(format!("agent {agent}")));
        }
        let script = state.script.pop_front().ok_or_else(|| {
            ServiceError::InvalidRequest("MockAgentService: no run scripted".into())
        })?;
        if let MockRun::Error(e) = script {
            return Err(e);
        }

        let polls_left = match &script {
            MockRun::Reply { polls, .. } | MockRun::Blocks { polls, .. } | MockRun::Fail { polls, .. } => *polls,
            _ => 0,
        };
        let created_at = state.tick();
        let run = Run {
            id: RunId::new(),
            thread_id: thread.clone(),
            agent_id: agent.clone(),
            status: RunStatus::Queued,
            last_error: None,
            created_at,
            steps: Vec::new(),
        };
        state.runs.insert(
            run.id.clone(),
            RunState { run: run.clone(), script, polls_left },
        );
        Ok(run)
    }

    async fn get_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, ServiceError> {
        let mut state = self.state.lock();
        state.record("get_run", run.as_str());
        match state.runs.get(run) {
            Some(entry) if &entry.run.thread_id == thread => {}
            _ => return Err(ServiceError::NotFound(format!("run {run}"))),
        }
        advance(&mut state, run)
    }

    async fn cancel_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, ServiceError> {
        let mut state = self.state.lock();
        state.record("cancel_run", run.as_str());
        let entry = state
            .runs
            .get_mut(run)
            .filter(|e| &e.run.thread_id == thread)
            .ok_or_else(|| ServiceError::NotFound(format!("run {run}")))?;
        if entry.run.status.is_terminal() {
            return Err(ServiceError::InvalidRequest(format!(
                "cannot cancel run with status {}",
                entry.run.status
            )));
        }
        entry.run.status = RunStatus::Cancelled;
        Ok(entry.run.clone())
    }

    async fn list_run_steps(
        &self,
        thread: &ThreadId,
        run: &RunId,
    ) -> Result<Vec<RunStep>, ServiceError> {
        let mut state = self.state.lock();
        state.record("list_run_steps", run.as_str());
        let entry = state
            .runs
            .get(run)
            .filter(|e| &e.run.thread_id == thread)
            .ok_or_else(|| ServiceError::NotFound(format!("run {run}")))?;
        if entry.run.status != RunStatus::Completed {
            return Ok(Vec::new());
        }
        Ok(vec![RunStep {
            id: StepId::new(),
            kind: StepKind::MessageCreation,
            status: RunStatus::Completed,
            tool_calls: Vec::new(),
        }])
    }

    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadedFile, ServiceError> {
        let mut state = self.state.lock();
        state.record("upload_file", filename);
        let file = UploadedFile {
            id: FileId::new(),
            filename: filename.to_string(),
            bytes: bytes.len() as u64,
        };
        state.files.insert(file.id.clone(), file.clone());
        Ok(file)
    }

    async fn delete_file(&self, file: &FileId) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        state.record("delete_file", file.as_str());
        state.check_delete(file.as_str())?;
        state
            .files
            .remove(file)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("file {file}")))
    }

    async fn create_vector_store(
        &self,
        name: &str,
        files: &[FileId],
    ) -> Result<VectorStore, ServiceError> {
        let mut state = self.state.lock();
        state.record("create_vector_store", name);
        if let Some(missing) = files.iter().find(|f| !state.files.contains_key(*f)) {
            return Err(ServiceError::InvalidRequest(format!("unknown file {missing}")));
        }
        let polls_left = state.store_polls;
        let store = VectorStore {
            id: VectorStoreId::new(),
            name: name.to_string(),
            status: if polls_left == 0 {
                VectorStoreStatus::Completed
            } else {
                VectorStoreStatus::InProgress
            },
            file_count: files.len() as u32,
        };
        state.stores.insert(
            store.id.clone(),
            StoreState { store: store.clone(), polls_left },
        );
        Ok(store)
    }

    async fn get_vector_store(&self, store: &VectorStoreId) -> Result<VectorStore, ServiceError> {
        let mut state = self.state.lock();
        let entry = state
            .stores
            .get_mut(store)
            .ok_or_else(|| ServiceError::NotFound(format!("vector store {store}")))?;
        if entry.polls_left > 0 {
            entry.polls_left -= 1;
        }
        if entry.polls_left == 0 {
            entry.store.status = VectorStoreStatus::Completed;
        }
        Ok(entry.store.clone())
    }

    async fn delete_vector_store(&self, store: &VectorStoreId) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        state.record("delete_vector_store", store.as_str());
        state.check_delete(store.as_str())?;
        state
            .stores
            .remove(store)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("vector store {store}")))
    }

    async fn get_connection(&self, name: &str) -> Result<Connection, ServiceError> {
        let mut state = self.state.lock();
        state.record("get_connection", name);
        state
            .connections
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("connection {name}")))
    }
}

/// Pre-programmed chat-completions responses.
pub enum MockChatResponse {
    Stream(Vec<ChatStreamEvent>),
    Error(ServiceError),
}

impl MockChatResponse {
    /// A well-formed stream: model, one delta per word, then `stop`.
    pub fn reply(model: &str, text: &str) -> Self {
        let mut events = vec![ChatStreamEvent::Model { name: model.to_string() }];
        events.extend(
            text.split_inclusive(' ')
                .map(|word| ChatStreamEvent::Delta { text: word.to_string() }),
        );
        events.push(ChatStreamEvent::Finished { reason: "stop".into() });
        Self::Stream(events)
    }
}

/// [`ChatCompletions`] that replays scripted responses and records requests.
pub struct MockChatCompletions {
    responses: Mutex<VecDeque<MockChatResponse>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockChatCompletions {
    pub fn new(responses: Vec<MockChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Message lists received so far, one entry per call.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatCompletions for MockChatCompletions {
    fn deployment(&self) -> &str {
        "mock-router"
    }

    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<ChatStream, ServiceError> {
        self.requests.lock().push(messages.to_vec());
        match self.responses.lock().pop_front() {
            Some(MockChatResponse::Stream(events)) => Ok(Box::pin(stream::iter(events))),
            Some(MockChatResponse::Error(e)) => Err(e),
            None => Err(ServiceError::InvalidRequest(
                "MockChatCompletions: no response configured".into(),
            )),
        }
    }
}
