//! Interactive (slash) commands.
//!
//! The table is built once at startup and only ever read; handlers get the
//! latest snapshot through the scheduler's feed and never see the state map.

use crate::{
    render::{render_text, RenderOptions},
    scheduler::SnapshotFeed,
};

/// Everything a handler may read.
pub struct CommandContext {
    pub snapshot: SnapshotFeed,
    pub render: RenderOptions,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandReply {
    pub content: String,
    /// Only visible to the invoking user.
    pub ephemeral: bool,
}

pub type CommandHandler = fn(&CommandContext) -> CommandReply;

#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub handler: CommandHandler,
}

pub struct CommandTable {
    commands: Vec<CommandSpec>,
}

impl CommandTable {
    pub fn new(commands: Vec<CommandSpec>) -> Self {
        Self { commands }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            CommandSpec {
                name: "stats",
                description: "Show the latest gathered stats",
                handler: stats_command,
            },
            CommandSpec {
                name: "ping",
                description: "Check that the bot is alive",
                handler: ping_command,
            },
        ])
    }

    pub fn specs(&self) -> &[CommandSpec] {
        &self.commands
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// Run the handler registered under `name`, if any.
    pub fn dispatch(&self, name: &str, ctx: &CommandContext) -> Option<CommandReply> {
        self.get(name).map(|cmd| (cmd.handler)(ctx))
    }
}

fn stats_command(ctx: &CommandContext) -> CommandReply {
    let content = match ctx.snapshot.borrow().as_deref() {
        Some(snapshot) => render_text(snapshot, &ctx.render),
        None => "Stats have not been gathered yet, try again shortly.".to_string(),
    };
    CommandReply {
        content,
        ephemeral: true,
    }
}

fn ping_command(_ctx: &CommandContext) -> CommandReply {
    CommandReply {
        content: "Pong!".to_string(),
        ephemeral: true,
    }
}
