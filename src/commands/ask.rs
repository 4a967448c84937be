use anyhow::Result;
use tokio_util::sync::CancellationToken;

use parley_core::agent::AgentRole;
use parley_engine::driver::NO_RESPONSE;
use parley_engine::transcript::render_messages;
use parley_engine::{ask_once, AgentSession, RunDriver};
use parley_settings::ParleySettings;

use super::{agent_service, close_session, print_steps, run_driver};
use crate::cli::AskArgs;
use crate::presets;

const VECTOR_STORE_NAME: &str = "agent_vectorstore";

pub async fn run(args: AskArgs, settings: &ParleySettings, cancel: &CancellationToken) -> Result<()> {
    let model = settings.require_model()?;
    let web_search = if args.web_search {
        Some(settings.require_web_search()?)
    } else {
        None
    };
    let service = agent_service(settings)?;
    let session = AgentSession::new(service.clone());
    let driver = run_driver(service, settings, args.steps);

    let result = ask(&session, &driver, &args, model, web_search, cancel).await;
    close_session(&session).await;
    result
}

async fn ask(
    session: &AgentSession,
    driver: &RunDriver,
    args: &AskArgs,
    model: &str,
    web_search: Option<&str>,
    cancel: &CancellationToken,
) -> Result<()> {
    let role = grounded_role(session, args, model, web_search, cancel).await?;
    let answer = ask_once(session, driver, &role, &args.question, cancel).await?;

    print!("{}", render_messages(&answer.transcript));
    if answer.reply.is_no_response() {
        println!("{}: {NO_RESPONSE}", answer.agent.name);
    }
    if args.steps {
        print_steps(&answer.run);
    }
    Ok(())
}

async fn grounded_role(
    session: &AgentSession,
    args: &AskArgs,
    model: &str,
    web_search: Option<&str>,
    cancel: &CancellationToken,
) -> Result<AgentRole> {
    if !args.files.is_empty() {
        let mut files = Vec::with_capacity(args.files.len());
        for path in &args.files {
            let file = session.upload_path(path).await?;
            println!("uploaded {} ({} bytes)", file.filename, file.bytes);
            files.push(file.id);
        }
        let store = session.create_vector_store(VECTOR_STORE_NAME, &files, cancel).await?;
        return Ok(presets::file_search_agent(model).with_file_search(store.id));
    }

    if let Some(connection) = web_search {
        let tool = session.web_search_tool(connection).await?;
        return Ok(presets::search_assistant(model).with_tool(tool));
    }

    Ok(presets::course_planner(model))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use parley_client::mock::{MockAgentService, MockRun};
    use parley_core::agent::ToolDefinition;
    use parley_engine::DriverConfig;

    fn args(files: Vec<std::path::PathBuf>, web_search: bool) -> AskArgs {
        AskArgs {
            question: "Does Contoso offer evening classes?".into(),
            files,
            web_search,
            steps: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn files_become_a_file_search_agent_and_are_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("FAQ.md");
        std::fs::write(&path, "Evening classes run Monday to Thursday.").unwrap();

        let svc = Arc::new(MockAgentService::new(vec![MockRun::reply("Yes, Monday to Thursday.")]));
        let session = AgentSession::new(svc.clone());
        let driver = RunDriver::new(svc.clone(), DriverConfig::default());

        ask(&session, &driver, &args(vec![path], false), "gpt-4o", None, &CancellationToken::new())
            .await
            .unwrap();

        let roles = svc.created_roles();
        assert_eq!(roles[0].name, "file-search-agent");
        assert_eq!(roles[0].tools, vec![ToolDefinition::FileSearch]);
        assert_eq!(roles[0].tool_resources.vector_store_ids.len(), 1);

        close_session(&session).await;
        assert_eq!(svc.agent_count(), 0);
        assert_eq!(svc.file_count(), 0);
        assert_eq!(svc.vector_store_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn web_search_attaches_connection() {
        let svc = Arc::new(
            MockAgentService::new(vec![MockRun::reply("Here is what I found.")])
                .with_connection("bing-conn", "/connections/bing-conn"),
        );
        let session = AgentSession::new(svc.clone());
        let driver = RunDriver::new(svc.clone(), DriverConfig::default());

        ask(&session, &driver, &args(Vec::new(), true), "gpt-4o", Some("bing-conn"), &CancellationToken::new())
            .await
            .unwrap();

        let roles = svc.created_roles();
        assert_eq!(roles[0].name, "search-assistant");
        assert_eq!(
            roles[0].tools,
            vec![ToolDefinition::WebSearch { connection_id: "/connections/bing-conn".into() }]
        );
    }

    #[tokio::test]
    async fn unknown_connection_fails_before_any_agent_exists() {
        let svc = Arc::new(MockAgentService::default());
        let session = AgentSession::new(svc.clone());
        let driver = RunDriver::new(svc.clone(), DriverConfig::default());

        let err = ask(&session, &driver, &args(Vec::new(), true), "gpt-4o", Some("nope"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("service error"));
        assert_eq!(svc.agent_count(), 0);
    }
}
