use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use parley_core::agent::AgentRole;
use parley_core::events::ConversationEvent;
use parley_engine::transcript::write_artifact;
use parley_engine::{
    AgentSession, ConversationOutcome, Participant, RoundRobinChat, RunDriver, Termination,
    TurnErrorPolicy,
};
use parley_settings::{ErrorPolicy, ParleySettings};

use super::{agent_service, close_session, run_driver};
use crate::cli::{GroupArgs, PlanArgs, ReviewArgs};
use crate::presets;

const DEFAULT_PLAN_OUTPUT: &str = "lesson_plan.txt";

/// One configured group conversation, ready to be created remotely.
struct Conversation {
    roles: Vec<AgentRole>,
    termination: Termination,
    task: String,
    decision_role: &'static str,
    policy: TurnErrorPolicy,
    output: Option<PathBuf>,
}

pub async fn plan(args: PlanArgs, settings: &ParleySettings, cancel: &CancellationToken) -> Result<()> {
    let web_search = if args.web_search {
        Some(settings.require_web_search()?)
    } else {
        None
    };
    let mut conversation = Conversation {
        roles: presets::lesson_planning_team(settings.require_model()?),
        termination: Termination::mention(presets::LESSON_PLAN_MARKER)
            | Termination::MaxMessages(max_messages(&args.group, settings)),
        task: presets::lesson_plan_task(&args.topic),
        decision_role: presets::DECISION_AGENT,
        policy: error_policy(&args.group, settings),
        output: Some(
            args.group
                .output
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PLAN_OUTPUT)),
        ),
    };
    let service = agent_service(settings)?;
    let session = AgentSession::new(service.clone());
    let driver = run_driver(service, settings, false);

    if let Some(connection) = web_search {
        let tool = session.web_search_tool(connection).await?;
        conversation.roles[0].tools.push(tool);
    }

    let result = converse(&session, driver, conversation, cancel).await.map(drop);
    close_session(&session).await;
    result
}

pub async fn review(args: ReviewArgs, settings: &ParleySettings, cancel: &CancellationToken) -> Result<()> {
    let conversation = Conversation {
        roles: presets::review_team(settings.require_model()?),
        termination: Termination::mention_ignore_case(presets::APPROVAL_MARKER)
            .from_agents([presets::EDUCATOR])
            | Termination::MaxMessages(max_messages(&args.group, settings)),
        task: args.task,
        decision_role: presets::LESSON_PLANNER,
        policy: error_policy(&args.group, settings),
        output: args.group.output,
    };
    let service = agent_service(settings)?;
    let session = AgentSession::new(service.clone());
    let driver = run_driver(service, settings, false);

    let result = converse(&session, driver, conversation, cancel).await.map(drop);
    close_session(&session).await;
    result
}

fn max_messages(args: &GroupArgs, settings: &ParleySettings) -> usize {
    args.max_messages
        .map_or(settings.chat.max_messages, |n| n as usize)
}

fn error_policy(args: &GroupArgs, settings: &ParleySettings) -> TurnErrorPolicy {
    if args.continue_on_error || settings.chat.error_policy == ErrorPolicy::Continue {
        TurnErrorPolicy::Continue
    } else {
        TurnErrorPolicy::Abort
    }
}

/// Create the participants and a shared thread, run the round robin while
/// printing progress, and write the decision role's final reply.
async fn converse(
    session: &AgentSession,
    driver: RunDriver,
    conversation: Conversation,
    cancel: &CancellationToken,
) -> Result<ConversationOutcome> {
    let mut participants = Vec::with_capacity(conversation.roles.len());
    for role in &conversation.roles {
        let agent = session.create_agent(role).await?;
        participants.push(Participant::new(role.name.clone(), agent.id));
    }
    let thread = session.create_thread().await?;

    let chat = RoundRobinChat::new(driver, participants, conversation.termination)
        .with_error_policy(conversation.policy)
        .with_decision_role(conversation.decision_role);
    let printer = tokio::spawn(print_events(chat.subscribe()));

    println!("# task: {}", conversation.task);
    let outcome = chat.run(&thread, &conversation.task, cancel).await;
    drop(chat);
    if let Err(e) = printer.await {
        warn!(error = %e, "event printer stopped");
    }
    let outcome = outcome?;

    println!("\nstopped after {} turns: {}", outcome.turns, outcome.reason);
    match (&outcome.final_artifact, &conversation.output) {
        (Some(artifact), Some(path)) => {
            write_artifact(path, artifact)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("final {} reply written to {}", conversation.decision_role, path.display());
        }
        (None, _) => println!("{} produced no final reply", conversation.decision_role),
        (Some(_), None) => {}
    }
    Ok(outcome)
}

async fn print_events(mut events: broadcast::Receiver<ConversationEvent>) {
    loop {
        match events.recv().await {
            Ok(ConversationEvent::TurnStarted { turn, agent }) => println!("\n── turn {turn}: {agent} ──"),
            Ok(ConversationEvent::TurnCompleted { text, .. }) => println!("{text}"),
            Ok(ConversationEvent::TurnFailed { error, .. }) => println!("Error: {error}"),
            Ok(ConversationEvent::Terminated { .. }) | Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "progress display fell behind");
            }
        }
    }
}
