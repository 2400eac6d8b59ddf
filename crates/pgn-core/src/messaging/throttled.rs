use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChannelId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, SummaryContent},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between two outbound calls.
    pub min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        // Message deletes are limited to roughly 5 per 5s per channel.
        Self {
            min_interval: Duration::from_secs(1),
        }
    }
}

/// Hands out evenly spaced call slots.
#[derive(Debug)]
struct Pacer {
    interval: Duration,
    next_slot: Option<Instant>,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: None,
        }
    }

    /// Claim the next slot; returns how long to wait for it.
    fn claim(&mut self, now: Instant) -> Duration {
        let slot = self.next_slot.map_or(now, |next| next.max(now));
        self.next_slot = Some(slot + self.interval);
        slot - now
    }
}

/// MessagingPort decorator that spaces outbound calls.
///
/// The summary loop is strictly sequential, so one pacer covers every
/// channel. Mostly matters for purges, which issue one delete per old message.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    pacer: Mutex<Pacer>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            pacer: Mutex::new(Pacer::new(cfg.min_interval)),
        }
    }

    async fn pace(&self) {
        let wait = self.pacer.lock().await.claim(Instant::now());
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_summary(
        &self,
        channel_id: &ChannelId,
        summary: &SummaryContent,
    ) -> Result<MessageRef> {
        self.pace().await;
        self.inner.send_summary(channel_id, summary).await
    }

    async fn edit_summary(&self, msg: &MessageRef, summary: &SummaryContent) -> Result<MessageRef> {
        self.pace().await;
        self.inner.edit_summary(msg, summary).await
    }

    async fn list_recent(&self, channel_id: &ChannelId, limit: u8) -> Result<Vec<MessageRef>> {
        self.pace().await;
        self.inner.list_recent(channel_id, limit).await
    }

    async fn delete_message(&self, msg: &MessageRef) -> Result<()> {
        self.pace().await;
        self.inner.delete_message(msg).await
    }
}
