use tokio_util::sync::CancellationToken;
use tracing::instrument;

use parley_core::agent::{Agent, AgentRole};
use parley_core::ids::ThreadId;
use parley_core::messages::{order_and_filter, Message};
use parley_core::run::Run;

use crate::driver::{Reply, RunDriver};
use crate::error::SessionError;
use crate::session::AgentSession;

/// Answer to a single grounded question.
#[derive(Clone, Debug)]
pub struct OneShotAnswer {
    pub agent: Agent,
    pub thread: ThreadId,
    pub reply: Reply,
    /// Thread messages with text, oldest first.
    pub transcript: Vec<Message>,
    pub run: Run,
}

/// Create an agent for `role` and a fresh thread, ask `question` once.
///
/// Both remote objects are owned by `session` and removed on close.
#[instrument(skip_all, fields(agent = %role.name))]
pub async fn ask_once(
    session: &AgentSession,
    driver: &RunDriver,
    role: &AgentRole,
    question: &str,
    cancel: &CancellationToken,
) -> Result<OneShotAnswer, SessionError> {
    if question.trim().is_empty() {
        return Err(crate::error::TurnError::EmptyInput.into());
    }

    let agent = session.create_agent(role).await?;
    let thread = session.create_thread().await?;
    let outcome = driver.run_turn(&agent.id, &thread, question, cancel).await?;

    Ok(OneShotAnswer {
        agent,
        thread,
        reply: outcome.reply,
        transcript: order_and_filter(outcome.messages),
        run: outcome.run,
    })
}
