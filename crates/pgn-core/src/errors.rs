use crate::domain::{ChannelId, MessageId, MessageRef};

/// Core error type for porygon.
///
/// Adapter crates map their specific errors into this type so the scheduler
/// can tell a stale message reference apart from everything else.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote reports that the referenced message does not exist (anymore).
    #[error("unknown message {message_id} in channel {channel_id}")]
    MessageNotFound {
        channel_id: ChannelId,
        message_id: MessageId,
    },

    #[error("datastore error: {0}")]
    Datastore(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn message_not_found(msg: &MessageRef) -> Self {
        Error::MessageNotFound {
            channel_id: msg.channel_id.clone(),
            message_id: msg.message_id.clone(),
        }
    }

    pub fn is_message_not_found(&self) -> bool {
        matches!(self, Error::MessageNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
