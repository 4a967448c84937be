use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "parley", version, about = "Talk to hosted agents from the terminal")]
pub struct Cli {
    /// Print buffered warnings and errors before exiting.
    #[arg(long, global = true)]
    pub log_panel: bool,

    /// Log filter directive, e.g. `info` or `parley_engine=debug`. `RUST_LOG` wins.
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ask one question, optionally grounded in documents or web search.
    Ask(AskArgs),
    /// Interactive chat on a single thread. Type `exit` to quit.
    Chat(ChatArgs),
    /// Four-agent lesson planning conversation.
    Plan(PlanArgs),
    /// Lesson planner and educator iterate until the educator approves.
    Review(ReviewArgs),
    /// Streamed chat through a model-routing deployment.
    Route(RouteArgs),
}

#[derive(Debug, Args)]
pub struct AskArgs {
    pub question: String,

    /// Upload a document and answer from it. Repeatable.
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Ground the answer with web search.
    #[arg(long, conflicts_with = "files")]
    pub web_search: bool,

    /// Print the run's execution steps.
    #[arg(long)]
    pub steps: bool,
}

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// Chat with an existing agent instead of creating one.
    #[arg(long, value_name = "ID", conflicts_with = "orchestrator")]
    pub agent_id: Option<String>,

    /// Chat with the configured orchestrator agent.
    #[arg(long)]
    pub orchestrator: bool,

    /// Print each run's execution steps.
    #[arg(long)]
    pub steps: bool,
}

#[derive(Debug, Args)]
pub struct GroupArgs {
    /// Stop after this many messages, counting the task.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(2..))]
    pub max_messages: Option<u32>,

    /// Keep going when a turn fails instead of stopping.
    #[arg(long)]
    pub continue_on_error: bool,

    /// Write the final artifact to this file.
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Lesson topic.
    #[arg(default_value = crate::presets::DEFAULT_TOPIC)]
    pub topic: String,

    /// Give the content curator web search.
    #[arg(long)]
    pub web_search: bool,

    #[command(flatten)]
    pub group: GroupArgs,
}

#[derive(Debug, Args)]
pub struct ReviewArgs {
    /// Task handed to the planner.
    #[arg(default_value = crate::presets::DEFAULT_REVIEW_TASK)]
    pub task: String,

    #[command(flatten)]
    pub group: GroupArgs,
}

#[derive(Debug, Args)]
pub struct RouteArgs {
    /// System prompt; defaults to the configured one.
    #[arg(long)]
    pub system: Option<String>,
}
