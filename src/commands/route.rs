use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;

use parley_client::AzureChatClient;
use parley_engine::{RoutedChat, RouterError};
use parley_settings::{credentials, ParleySettings};

use super::{is_exit, Prompt};
use crate::cli::RouteArgs;

pub async fn run(args: RouteArgs, settings: &ParleySettings, cancel: &CancellationToken) -> Result<()> {
    let endpoint = settings.require_router_endpoint()?;
    let key = credentials::router_key(credentials::from_env)?;
    let router = &settings.router;
    let client = AzureChatClient::new(endpoint, &router.deployment, &router.api_version, key)?;

    let system = args.system.unwrap_or_else(|| router.system_prompt.clone());
    let mut chat = RoutedChat::new(Arc::new(client), system, router.chat_options());

    println!(
        "routing through {}. Commands: 'usage', 'clear', 'exit'.",
        router.deployment
    );
    route_loop(&mut chat, &mut Prompt::stdin(), cancel).await?;
    print!("{}", render_usage(&chat));
    Ok(())
}

async fn route_loop<R: AsyncBufRead + Unpin>(
    chat: &mut RoutedChat,
    prompt: &mut Prompt<R>,
    cancel: &CancellationToken,
) -> Result<()> {
    while let Some(line) = prompt.next("you> ", cancel).await? {
        let text = line.trim();
        if is_exit(text) {
            break;
        }
        match text {
            "" => continue,
            "usage" => print!("{}", render_usage(chat)),
            "clear" => {
                chat.clear();
                println!("conversation cleared");
            }
            _ => {
                let mut out = std::io::stdout();
                let result = chat
                    .send(text, cancel, |chunk| {
                        let _ = out.write_all(chunk.as_bytes());
                        let _ = out.flush();
                    })
                    .await;
                match result {
                    Ok(reply) => println!("\n[model: {}]", reply.model),
                    Err(RouterError::Cancelled) => {
                        println!();
                        break;
                    }
                    Err(e) => eprintln!("\nError: {e}"),
                }
            }
        }
    }
    Ok(())
}

fn render_usage(chat: &RoutedChat) -> String {
    let usage = chat.usage();
    if usage.is_empty() {
        return "no replies yet\n".to_string();
    }

    let mut out = String::from("model usage:\n");
    for entry in &usage {
        out.push_str(&format!(
            "  {:<28} {:>4}  {:>5.1}%\n",
            entry.model, entry.count, entry.percent
        ));
    }
    let recent = chat.recent_models(5);
    out.push_str(&format!("recent: {}\n", recent.join(", ")));
    out
}
