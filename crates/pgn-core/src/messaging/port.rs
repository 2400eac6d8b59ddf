use async_trait::async_trait;

use crate::{
    domain::{ChannelId, MessageRef},
    messaging::types::{MessagingCapabilities, SummaryContent},
    Result,
};

/// Cross-messenger port used by the channel reconciler.
///
/// `edit_summary` must report a missing target as [`crate::Error::MessageNotFound`];
/// every other failure is treated as transient.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_summary(&self, channel_id: &ChannelId, summary: &SummaryContent)
        -> Result<MessageRef>;
    async fn edit_summary(&self, msg: &MessageRef, summary: &SummaryContent) -> Result<MessageRef>;

    /// Most recent messages first, at most `limit`.
    async fn list_recent(&self, channel_id: &ChannelId, limit: u8) -> Result<Vec<MessageRef>>;
    async fn delete_message(&self, msg: &MessageRef) -> Result<()>;
}
