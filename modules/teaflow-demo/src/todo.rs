//! Todo-list domain: messages, commands, and the three callbacks.

use std::time::Duration;

use anyhow::Result;
use teaflow_core::{Commands, EffectExt, Initial, Messages, UpdateExt};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Item {
    pub title: String,
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Todos {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Msg {
    Add(String),
    Toggle(usize),
    Clear,
    Added(Item),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cmd {
    /// Create an item in the store.
    Append(String),
    Save(Vec<Item>),
}

/// Parse one input line: `add <title>`, `done <n>` (1-based) or `clear`.
pub fn parse(line: &str) -> Option<Msg> {
    let line = line.trim();
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    match verb {
        "add" if !rest.trim().is_empty() => Some(Msg::Add(rest.trim().to_string())),
        "done" => rest
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .map(Msg::Toggle),
        "clear" => Some(Msg::Clear),
        _ => None,
    }
}

pub async fn initialize() -> Result<Initial<Todos, Cmd>> {
    Ok(Initial::from_state(Todos::default()))
}

pub fn update(message: &Msg, state: &Todos) -> Result<(Todos, Commands<Cmd>)> {
    Ok(match message {
        Msg::Add(title) => state.clone().command(Cmd::Append(title.clone())),
        Msg::Toggle(index) => {
            let Some(item) = state.items.get(*index) else {
                return Ok(state.clone().no_command());
            };
            let mut items = state.items.clone();
            items[*index] = Item {
                done: !item.done,
                ..item.clone()
            };
            Todos {
                items: items.clone(),
            }
            .command(Cmd::Save(items))
        }
        Msg::Clear => Todos::default().command(Cmd::Save(Vec::new())),
        Msg::Added(item) => {
            let mut items = state.items.clone();
            items.push(item.clone());
            Todos {
                items: items.clone(),
            }
            .command(Cmd::Save(items))
        }
    })
}

pub async fn resolve(command: Cmd) -> Result<Messages<Msg>> {
    if matches!(command, Cmd::Save(..)) {
        command.side_effect(save).await
    } else {
        command.effect(append).await
    }
}

async fn append(command: Cmd) -> Result<Option<Msg>> {
    let Cmd::Append(title) = command else {
        return Ok(None);
    };
    // Stand-in for a slow store.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(Some(Msg::Added(Item { title, done: false })))
}

async fn save(command: Cmd) -> Result<()> {
    if let Cmd::Save(items) = command {
        info!(items = items.len(), "Saved todo list");
    }
    Ok(())
}
