//! Per-channel reconciliation of the summary post.
//!
//! For each channel: edit the stored message in place when possible, create a
//! new one when there is none or the stored one is gone, and persist the map
//! right after any create. Channels are handled strictly one after another.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    domain::{ChannelId, MessageId, MessageRef},
    messaging::{port::MessagingPort, types::SummaryContent},
    state::MessageStateStore,
    Result,
};

/// Whether to clear a channel before posting a fresh summary.
#[derive(Clone, Copy, Debug)]
pub struct PurgePolicy {
    pub enabled: bool,
    /// How many of the most recent messages to list (and delete).
    pub window: u8,
}

impl PurgePolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            window: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Stored message edited in place.
    Edited(MessageRef),
    /// No stored message; a new one was created.
    Created(MessageRef),
    /// Stored message was gone; a replacement was created.
    Replaced { stale: MessageId, current: MessageRef },
}

impl ReconcileOutcome {
    pub fn message(&self) -> &MessageRef {
        match self {
            ReconcileOutcome::Edited(m) | ReconcileOutcome::Created(m) => m,
            ReconcileOutcome::Replaced { current, .. } => current,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Persisted {
    NotNeeded,
    Saved,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciled {
    pub outcome: ReconcileOutcome,
    pub persisted: Persisted,
}

/// Tally of one cycle over all channels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub edited: usize,
    pub created: usize,
    pub replaced: usize,
    pub failed: usize,
    pub persist_failures: usize,
}

impl CycleReport {
    fn add(&mut self, result: &Result<Reconciled>) {
        match result {
            Ok(r) => {
                match r.outcome {
                    ReconcileOutcome::Edited(_) => self.edited += 1,
                    ReconcileOutcome::Created(_) => self.created += 1,
                    ReconcileOutcome::Replaced { .. } => self.replaced += 1,
                }
                if r.persisted == Persisted::Failed {
                    self.persist_failures += 1;
                }
            }
            Err(_) => self.failed += 1,
        }
    }
}

pub struct ChannelReconciler {
    messenger: Arc<dyn MessagingPort>,
    purge: PurgePolicy,
}

impl ChannelReconciler {
    pub fn new(messenger: Arc<dyn MessagingPort>, purge: PurgePolicy) -> Self {
        let max = messenger.capabilities().max_list_limit.max(1);
        Self {
            messenger,
            purge: PurgePolicy {
                window: purge.window.clamp(1, max),
                ..purge
            },
        }
    }

    /// Reconcile every channel in order. A failing channel never stops the others.
    pub async fn reconcile_all(
        &self,
        state: &mut MessageStateStore,
        channels: &[ChannelId],
        summary: &SummaryContent,
    ) -> CycleReport {
        let mut report = CycleReport::default();
        for channel_id in channels {
            let result = self.reconcile(state, channel_id, summary).await;
            if let Err(e) = &result {
                warn!(channel = %channel_id, "skipping channel this cycle: {e}");
            }
            report.add(&result);
        }
        report
    }

    /// Converge one channel to `summary`.
    ///
    /// Stored state is only touched after a successful create (or an edit that
    /// came back with a different id). Any other error leaves it as is.
    pub async fn reconcile(
        &self,
        state: &mut MessageStateStore,
        channel_id: &ChannelId,
        summary: &SummaryContent,
    ) -> Result<Reconciled> {
        let stored = state.get(channel_id).cloned();

        let outcome = match &stored {
            None => ReconcileOutcome::Created(self.create(channel_id, summary).await?),
            Some(message_id) => {
                let target = MessageRef::new(channel_id.clone(), message_id.clone());
                match self.messenger.edit_summary(&target, summary).await {
                    Ok(msg) => ReconcileOutcome::Edited(msg),
                    Err(e) if e.is_message_not_found() => {
                        info!(channel = %channel_id, message = %message_id, "stored summary is gone, posting a new one");
                        ReconcileOutcome::Replaced {
                            stale: message_id.clone(),
                            current: self.create(channel_id, summary).await?,
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        // Creates always persist, even if the id happens to match.
        let must_persist = match &outcome {
            ReconcileOutcome::Edited(msg) => stored.as_ref() != Some(&msg.message_id),
            ReconcileOutcome::Created(_) | ReconcileOutcome::Replaced { .. } => true,
        };

        let persisted = if must_persist {
            let msg = outcome.message();
            state.record(msg.channel_id.clone(), msg.message_id.clone());
            match state.save() {
                Ok(()) => Persisted::Saved,
                Err(e) => {
                    warn!(channel = %channel_id, path = %state.path().display(), "error saving message ids: {e}");
                    Persisted::Failed
                }
            }
        } else {
            Persisted::NotNeeded
        };

        Ok(Reconciled { outcome, persisted })
    }

    async fn create(&self, channel_id: &ChannelId, summary: &SummaryContent) -> Result<MessageRef> {
        if self.purge.enabled {
            self.purge(channel_id).await;
        }
        let msg = self.messenger.send_summary(channel_id, summary).await?;
        info!(channel = %channel_id, message = %msg.message_id, "posted new summary");
        Ok(msg)
    }

    /// Best-effort: list/delete failures are logged and ignored.
    async fn purge(&self, channel_id: &ChannelId) {
        let recent = match self.messenger.list_recent(channel_id, self.purge.window).await {
            Ok(v) => v,
            Err(e) => {
                warn!(channel = %channel_id, "could not list old messages: {e}");
                return;
            }
        };

        let mut deleted = 0usize;
        for msg in &recent {
            match self.messenger.delete_message(msg).await {
                Ok(()) => deleted += 1,
                Err(e) => debug!(channel = %channel_id, message = %msg.message_id, "delete failed: {e}"),
            }
        }
        debug!(channel = %channel_id, listed = recent.len(), deleted, "purged old messages");
    }
}
