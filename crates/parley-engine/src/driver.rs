use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use parley_core::ids::{AgentId, RunId, ThreadId};
use parley_core::messages::{order_messages, ListOrder, Message, Role};
use parley_core::run::{Run, RunStatus};
use parley_core::service::AgentService;

use crate::error::TurnError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Rendering of [`Reply::NoResponse`].
pub const NO_RESPONSE: &str = "No response";

/// Configuration for the run driver.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Delay between two status polls of a submitted run.
    pub poll_interval: Duration,
    /// Give up on a run after this long. `None` waits indefinitely.
    pub run_timeout: Option<Duration>,
    /// Fetch run steps for completed runs.
    pub fetch_steps: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            run_timeout: None,
            fetch_steps: false,
        }
    }
}

/// What a completed run said.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// The run completed without an assistant text message.
    NoResponse,
}

impl Reply {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::NoResponse => NO_RESPONSE,
        }
    }

    pub fn is_no_response(&self) -> bool {
        matches!(self, Self::NoResponse)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one completed turn.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub reply: Reply,
    /// The terminal run, with steps when the driver was asked to fetch them.
    pub run: Run,
    /// Every thread message after the run, oldest first.
    pub messages: Vec<Message>,
}

/// Drives one agent turn on a remote thread: submit, poll, collect.
#[derive(Clone)]
pub struct RunDriver {
    service: Arc<dyn AgentService>,
    config: DriverConfig,
}

impl RunDriver {
    pub fn new(service: Arc<dyn AgentService>, config: DriverConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<dyn AgentService> {
        &self.service
    }

    /// Append `text` as a user message, run `agent` on `thread`, and wait for
    /// the reply.
    #[instrument(skip_all, fields(agent = %agent, thread = %thread))]
    pub async fn run_turn(
        &self,
        agent: &AgentId,
        thread: &ThreadId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        if text.trim().is_empty() {
            return Err(TurnError::EmptyInput);
        }
        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }

        self.service.create_message(thread, Role::User, text).await?;
        self.execute(agent, thread, cancel).await
    }

    /// Run `agent` against the thread as it is, without adding a message.
    #[instrument(skip_all, fields(agent = %agent, thread = %thread))]
    pub async fn resume_turn(
        &self,
        agent: &AgentId,
        thread: &ThreadId,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }
        self.execute(agent, thread, cancel).await
    }

    async fn execute(
        &self,
        agent: &AgentId,
        thread: &ThreadId,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let started = Instant::now();
        let run = self.service.create_run(thread, agent).await?;
        debug!(run_id = %run.id, "run submitted");

        let mut run = self.wait(thread, run, cancel).await?;
        info!(
            run_id = %run.id,
            status = %run.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );

        match run.status {
            RunStatus::Completed => {}
            RunStatus::Failed => {
                return Err(TurnError::RunFailed {
                    run_id: run.id,
                    last_error: run.last_error,
                });
            }
            RunStatus::RequiresAction => {
                self.abandon(thread, &run.id).await;
                return Err(TurnError::RequiresAction { run_id: run.id });
            }
            status => {
                return Err(TurnError::RunEnded {
                    run_id: run.id,
                    status,
                    last_error: run.last_error,
                });
            }
        }

        if self.config.fetch_steps {
            match self.service.list_run_steps(thread, &run.id).await {
                Ok(steps) => run.steps = steps,
                Err(e) => warn!(run_id = %run.id, error = %e, "could not fetch run steps"),
            }
        }

        let messages = order_messages(self.service.list_messages(thread, ListOrder::Asc).await?);
        let reply = match reply_for_run(&messages, &run.id) {
            Some(text) => Reply::Text(text.to_string()),
            None => {
                warn!(run_id = %run.id, "run completed without an assistant reply");
                Reply::NoResponse
            }
        };

        Ok(TurnOutcome { reply, run, messages })
    }

    /// Poll until the run is terminal or waiting on client-side tool outputs.
    async fn wait(
        &self,
        thread: &ThreadId,
        mut run: Run,
        cancel: &CancellationToken,
    ) -> Result<Run, TurnError> {
        let deadline = self.config.run_timeout.map(|t| Instant::now() + t);

        while !run.status.is_terminal() && run.status != RunStatus::RequiresAction {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.abandon(thread, &run.id).await;
                    return Err(TurnError::Cancelled);
                }
                _ = sleep_until(deadline) => {
                    warn!(run_id = %run.id, "run exceeded its deadline");
                    self.abandon(thread, &run.id).await;
                    return Err(TurnError::Timeout(self.config.run_timeout.unwrap_or_default()));
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            run = self.service.get_run(thread, &run.id).await?;
            debug!(run_id = %run.id, status = %run.status, "polled run");
        }

        Ok(run)
    }

    /// Best-effort remote cancellation. Failures are logged, not returned.
    async fn abandon(&self, thread: &ThreadId, run: &RunId) {
        if let Err(e) = self.service.cancel_run(thread, run).await {
            warn!(run_id = %run, error = %e, "failed to cancel run");
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Text of the newest assistant message produced by `run`.
///
/// Messages the service did not attribute to any run are accepted too, so
/// the lookup still works against listings that omit `run_id`.
fn reply_for_run<'a>(ordered: &'a [Message], run: &RunId) -> Option<&'a str> {
    ordered
        .iter()
        .rev()
        .filter(|m| m.is_assistant())
        .filter(|m| m.run_id.as_ref().map_or(true, |id| id == run))
        .find_map(Message::first_text)
}
