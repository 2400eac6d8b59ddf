//! Slash-command registration and interaction replies.

use serde_json::{json, Value};
use tracing::{info, warn};

use pgn_core::{
    commands::{CommandContext, CommandTable},
    Result,
};

use crate::{clip, DiscordMessenger};

const CHAT_INPUT: u8 = 1;
const INTERACTION_PING: u64 = 1;
const INTERACTION_APPLICATION_COMMAND: u64 = 2;
const RESPONSE_PONG: u8 = 1;
const RESPONSE_CHANNEL_MESSAGE: u8 = 4;
const FLAG_EPHEMERAL: u64 = 1 << 6;
const MAX_CONTENT_LEN: usize = 2000;

pub fn registration_payload(table: &CommandTable) -> Value {
    Value::Array(
        table
            .specs()
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "description": c.description,
                    "type": CHAT_INPUT,
                })
            })
            .collect(),
    )
}

/// Replace the application's global commands with `table`.
pub async fn register_commands(
    messenger: &DiscordMessenger,
    application_id: &str,
    table: &CommandTable,
) -> Result<usize> {
    let path = format!("/applications/{application_id}/commands");
    let registered = messenger
        .put_json(&path, &registration_payload(table))
        .await?;
    let count = registered.as_array().map(Vec::len).unwrap_or(0);
    info!(count, "registered slash commands");
    Ok(count)
}

/// Map an interaction payload to the response body Discord expects.
///
/// Returns `None` for interaction types and commands we do not handle.
pub fn interaction_response(
    table: &CommandTable,
    ctx: &CommandContext,
    interaction: &Value,
) -> Option<Value> {
    match interaction.get("type").and_then(Value::as_u64)? {
        INTERACTION_PING => Some(json!({ "type": RESPONSE_PONG })),
        INTERACTION_APPLICATION_COMMAND => {
            let name = interaction.pointer("/data/name").and_then(Value::as_str)?;
            let Some(reply) = table.dispatch(name, ctx) else {
                warn!(command = name, "unknown command");
                return None;
            };

            let mut data = json!({ "content": clip(&reply.content, MAX_CONTENT_LEN) });
            if reply.ephemeral {
                data["flags"] = json!(FLAG_EPHEMERAL);
            }
            Some(json!({ "type": RESPONSE_CHANNEL_MESSAGE, "data": data }))
        }
        _ => None,
    }
}
