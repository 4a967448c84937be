use anyhow::Result;
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;

use parley_core::agent::Agent;
use parley_core::ids::{AgentId, ThreadId};
use parley_engine::{AgentSession, RunDriver, TurnError};
use parley_settings::ParleySettings;

use super::{agent_service, close_session, is_exit, print_steps, run_driver, Prompt};
use crate::cli::ChatArgs;
use crate::presets;

enum ChatAgent<'a> {
    Existing(AgentId),
    New { model: &'a str },
}

pub async fn run(args: ChatArgs, settings: &ParleySettings, cancel: &CancellationToken) -> Result<()> {
    let target = match (&args.agent_id, args.orchestrator) {
        (Some(id), _) => ChatAgent::Existing(AgentId::from_raw(id.as_str())),
        (None, true) => ChatAgent::Existing(AgentId::from_raw(settings.require_orchestrator()?)),
        (None, false) => ChatAgent::New {
            model: settings.require_model()?,
        },
    };

    let service = agent_service(settings)?;
    let session = AgentSession::new(service.clone());
    let driver = run_driver(service, settings, args.steps);

    let result = open_and_chat(&session, &driver, target, args.steps, cancel).await;
    close_session(&session).await;
    result
}

async fn open_and_chat(
    session: &AgentSession,
    driver: &RunDriver,
    target: ChatAgent<'_>,
    steps: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let agent = match target {
        ChatAgent::Existing(id) => session.adopt_agent(&id).await?,
        ChatAgent::New { model } => session.create_agent(&presets::course_planner(model)).await?,
    };
    let thread = session.create_thread().await?;
    println!("chatting with {} on {thread}. Type 'exit' to quit.", agent.name);

    chat_loop(driver, &agent, &thread, steps, &mut Prompt::stdin(), cancel).await
}

/// Send each line as a turn on one thread until `exit`, end of input or
/// cancellation. Failed turns are reported and the loop continues.
async fn chat_loop<R: AsyncBufRead + Unpin>(
    driver: &RunDriver,
    agent: &Agent,
    thread: &ThreadId,
    steps: bool,
    prompt: &mut Prompt<R>,
    cancel: &CancellationToken,
) -> Result<()> {
    while let Some(line) = prompt.next("> ", cancel).await? {
        if is_exit(&line) {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        match driver.run_turn(&agent.id, thread, text, cancel).await {
            Ok(outcome) => {
                println!("# {}: {}", agent.name, outcome.reply);
                if steps {
                    print_steps(&outcome.run);
                }
            }
            Err(TurnError::Cancelled) => break,
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use parley_client::mock::{MockAgentService, MockRun};
    use parley_core::messages::Role;
    use parley_engine::DriverConfig;

    async fn scripted(svc: &Arc<MockAgentService>, input: &str) -> (AgentSession, ThreadId) {
        let session = AgentSession::new(svc.clone());
        let agent = session
            .create_agent(&presets::course_planner("gpt-4o"))
            .await
            .unwrap();
        let thread = session.create_thread().await.unwrap();
        let driver = RunDriver::new(svc.clone(), DriverConfig::default());

        let mut prompt = Prompt::new(input.as_bytes());
        chat_loop(&driver, &agent, &thread, true, &mut prompt, &CancellationToken::new())
            .await
            .unwrap();
        (session, thread)
    }

    fn user_turns(svc: &MockAgentService, thread: &ThreadId) -> Vec<String> {
        svc.thread_messages(thread)
            .into_iter()
            .filter(|m| m.role == Role::User)
            .filter_map(|m| m.first_text().map(str::to_string))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn one_thread_until_exit() {
        let svc = Arc::new(MockAgentService::new(vec![
            MockRun::reply("Semester 1: Algebra"),
            MockRun::reply("Semester 2: Geometry"),
            MockRun::reply("never used"),
        ]));
        let (session, thread) =
            scripted(&svc, "Plan math\n  \nAnd next term?\nEXIT\nignored\n").await;

        assert_eq!(svc.thread_count(), 1);
        assert_eq!(user_turns(&svc, &thread), vec!["Plan math", "And next term?"]);
        assert_eq!(svc.remaining_script(), 1);
        assert!(session.close().await.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_turn_keeps_the_session_usable() {
        let svc = Arc::new(MockAgentService::new(vec![
            MockRun::fail("server_error", "upstream timeout"),
            MockRun::reply("Recovered"),
        ]));
        let (session, thread) = scripted(&svc, "first\nsecond\n").await;

        assert_eq!(user_turns(&svc, &thread), vec!["first", "second"]);
        assert!(svc
            .thread_messages(&thread)
            .iter()
            .any(|m| m.first_text() == Some("Recovered")));
        session.close().await;
    }

    #[tokio::test]
    async fn adopted_agent_is_left_in_place() {
        let svc = Arc::new(MockAgentService::default());
        let id = svc.seed_agent("asst_orchestrator", "orchestrator");
        let session = AgentSession::new(svc.clone());
        let driver = RunDriver::new(svc.clone(), DriverConfig::default());

        let agent = session.adopt_agent(&id).await.unwrap();
        let thread = session.create_thread().await.unwrap();
        chat_loop(&driver, &agent, &thread, false, &mut Prompt::new(&b""[..]), &CancellationToken::new())
            .await
            .unwrap();

        session.close().await;
        assert_eq!(svc.agent_count(), 1);
        assert_eq!(svc.thread_count(), 0);
    }
}
