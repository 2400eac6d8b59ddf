//! Refresh loop: aggregate -> render -> reconcile every channel -> sleep.
//!
//! - Runs immediately on start, then every `refresh_interval`
//! - Any aggregation failure (including the datastore connect) sleeps for the
//!   shorter `error_refresh_interval` instead
//! - Never exits on its own; the cancellation token is only checked while
//!   sleeping. [`stop`] gives a running cycle a short grace period and then
//!   abandons it
//! - Owns the message state map; nothing else writes it

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    domain::ChannelId,
    messaging::port::MessagingPort,
    reconcile::{ChannelReconciler, CycleReport, PurgePolicy},
    render::{render_summary, RenderOptions},
    state::MessageStateStore,
    stats::{AggregateSnapshot, AggregationFailure, Aggregator},
};

/// Latest successful snapshot, shared read-only with command handlers.
pub type SnapshotFeed = watch::Receiver<Option<Arc<AggregateSnapshot>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cadence {
    pub refresh_interval: Duration,
    pub error_refresh_interval: Duration,
}

impl Cadence {
    pub fn delay_after(&self, outcome: &CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::Completed(_) => self.refresh_interval,
            CycleOutcome::AggregationFailed(_) => self.error_refresh_interval,
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    AggregationFailed(AggregationFailure),
}

pub struct SummaryScheduler {
    aggregator: Aggregator,
    reconciler: ChannelReconciler,
    state: MessageStateStore,
    channels: Vec<ChannelId>,
    render: RenderOptions,
    cadence: Cadence,
    latest: watch::Sender<Option<Arc<AggregateSnapshot>>>,
}

impl SummaryScheduler {
    pub fn new(
        cfg: &Config,
        aggregator: Aggregator,
        messenger: Arc<dyn MessagingPort>,
        state: MessageStateStore,
    ) -> Self {
        let purge = PurgePolicy {
            enabled: cfg.delete_old_embeds,
            window: cfg.purge_window,
        };
        let (latest, _) = watch::channel(None);

        Self {
            aggregator,
            reconciler: ChannelReconciler::new(messenger, purge),
            state,
            channels: cfg.discord.channel_ids.clone(),
            render: RenderOptions::from_config(cfg),
            cadence: Cadence {
                refresh_interval: cfg.refresh_interval,
                error_refresh_interval: cfg.error_refresh_interval,
            },
            latest,
        }
    }

    pub fn subscribe(&self) -> SnapshotFeed {
        self.latest.subscribe()
    }

    pub fn state(&self) -> &MessageStateStore {
        &self.state
    }

    /// One full pass. Aggregation failures stop the pass before any transport call.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let snapshot = match self.aggregator.aggregate().await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                error!(stage = %e.stage, "failed to fetch stats: {e}");
                return CycleOutcome::AggregationFailed(e);
            }
        };
        self.latest.send_replace(Some(snapshot.clone()));

        let summary = render_summary(&snapshot, &self.render, Utc::now());
        let report = self
            .reconciler
            .reconcile_all(&mut self.state, &self.channels, &summary)
            .await;

        info!(
            edited = report.edited,
            created = report.created,
            replaced = report.replaced,
            failed = report.failed,
            persist_failures = report.persist_failures,
            "summary cycle complete"
        );
        CycleOutcome::Completed(report)
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(channels = self.channels.len(), "starting summary loop");
        loop {
            let outcome = self.run_cycle().await;
            let delay = self.cadence.delay_after(&outcome);

            tokio::select! {
              _ = cancel.cancelled() => {
                info!("summary loop stopped");
                break;
              }
              _ = sleep(delay) => {}
            }
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

/// Cancel the loop and wait up to `grace` for it to finish; abort it after that.
///
/// Returns `true` if the loop stopped on its own.
pub async fn stop(mut task: JoinHandle<()>, cancel: &CancellationToken, grace: Duration) -> bool {
    cancel.cancel();
    match timeout(grace, &mut task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("summary loop ended abnormally: {e}");
            false
        }
        Err(_) => {
            warn!(?grace, "summary cycle still running, abandoning it");
            task.abort();
            false
        }
    }
}
