pub mod ask;
pub mod chat;
pub mod group;
pub mod route;

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;

use parley_client::HttpAgentService;
use parley_core::run::{Run, StepKind};
use parley_core::service::AgentService;
use parley_engine::{AgentSession, DriverConfig, RunDriver};
use parley_settings::{credentials, ParleySettings};

use crate::cli::Command;

pub async fn dispatch(command: Command, settings: &ParleySettings, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::Ask(args) => ask::run(args, settings, cancel).await,
        Command::Chat(args) => chat::run(args, settings, cancel).await,
        Command::Plan(args) => group::plan(args, settings, cancel).await,
        Command::Review(args) => group::review(args, settings, cancel).await,
        Command::Route(args) => route::run(args, settings, cancel).await,
    }
}

pub(crate) fn agent_service(settings: &ParleySettings) -> Result<Arc<dyn AgentService>> {
    let endpoint = settings.require_endpoint()?;
    let credential = credentials::project_credential(credentials::from_env)?;
    let service =
        HttpAgentService::with_api_version(endpoint, credential, &settings.service.api_version)?;
    Ok(Arc::new(service))
}

pub(crate) fn run_driver(
    service: Arc<dyn AgentService>,
    settings: &ParleySettings,
    steps: bool,
) -> RunDriver {
    RunDriver::new(
        service,
        DriverConfig {
            poll_interval: settings.service.poll_interval(),
            run_timeout: settings.service.run_timeout(),
            fetch_steps: steps || settings.service.fetch_steps,
        },
    )
}

/// Delete everything the session created and report what could not be.
pub(crate) async fn close_session(session: &AgentSession) {
    let report = session.close().await;
    for (resource, error) in &report.failed {
        eprintln!("warning: could not delete {resource}: {error}");
    }
}

pub(crate) fn print_steps(run: &Run) {
    println!("agent flow ({}):", run.id);
    for (i, step) in run.steps.iter().enumerate() {
        let kind = match step.kind {
            StepKind::MessageCreation => "message_creation",
            StepKind::ToolCalls => "tool_calls",
        };
        println!("  step {}: {kind} - {}", i + 1, step.status);
        for call in &step.tool_calls {
            println!("    tool: {}", call.name.as_deref().unwrap_or(&call.kind));
        }
    }
}

/// Line reader that gives up when the token is cancelled.
pub(crate) struct Prompt<R> {
    lines: Lines<R>,
}

impl Prompt<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> Prompt<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// `None` on end of input or cancellation.
    pub async fn next(&mut self, label: &str, cancel: &CancellationToken) -> Result<Option<String>> {
        let mut out = std::io::stdout();
        write!(out, "{label}")?;
        out.flush()?;
        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            line = self.lines.next_line() => Ok(line?),
        }
    }
}

pub(crate) fn is_exit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("exit")
}
