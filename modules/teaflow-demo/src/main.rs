mod session;
mod todo;

use std::time::Duration;

use anyhow::Result;
use teaflow_core::{Component, Env, Scope, ShareOptions, Snapshot};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use todo::{Cmd, Msg, Todos};

/// How long to wait for in-flight work after stdin closes.
const QUIET: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(log_filter()?).init();

    info!("Todo demo starting...");

    let options = ShareOptions::from_env()?;
    options.log_summary();

    let env = Env::new(todo::initialize, todo::resolve, todo::update, Scope::new())
        .with_share_options(options);
    let component = Component::new(env).with(|snapshot: Snapshot<Msg, Todos, Cmd>| async move {
        debug!(
            message = ?snapshot.message(),
            commands = snapshot.commands().len(),
            "Snapshot"
        );
    });

    println!("Commands: add <title> | done <n> | clear  (Ctrl-D to quit)");

    let last = session::run(&component, stdin_messages(), QUIET, render).await?;
    info!(items = last.items.len(), "Todo demo finished");
    Ok(())
}

/// `RUST_LOG` plus info for this binary and the runtime.
fn log_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("todo=info".parse()?)
        .add_directive("teaflow=info".parse()?))
}

/// Parsed stdin lines, ending with the input.
fn stdin_messages() -> impl futures::Stream<Item = Msg> + Send {
    async_stream::stream! {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match todo::parse(&line) {
                    Some(message) => yield message,
                    None if line.trim().is_empty() => {}
                    None => warn!(line = %line, "Unrecognised input"),
                },
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "Failed to read stdin");
                    break;
                }
            }
        }
    }
}

fn render(state: &Todos) {
    println!("---");
    if state.items.is_empty() {
        println!("  (empty)");
    }
    for (n, item) in state.items.iter().enumerate() {
        let mark = if item.done { "x" } else { " " };
        println!("  {}. [{mark}] {}", n + 1, item.title);
    }
}
