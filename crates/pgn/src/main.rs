use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pgn_core::{
    commands::{CommandContext, CommandTable},
    config::Config,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    render::RenderOptions,
    scheduler::{self, SummaryScheduler},
    state::MessageStateStore,
    stats::{Aggregator, LiveApi},
};
use pgn_discord::{
    commands::register_commands,
    interactions::{self, InteractionState, SignatureVerifier},
    DiscordMessenger,
};
use pgn_golbat::{GolbatApi, MySqlConnector};

/// How long a running cycle may take to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pgn_core::logging::init("pgn")?;

    let cfg = Config::load().context("invalid configuration")?;
    let state = MessageStateStore::load(cfg.message_ids_file.clone());
    info!(
        path = %state.path().display(),
        channels = state.len(),
        "loaded message ids"
    );

    let discord = DiscordMessenger::new(&cfg.discord)?;
    let me = discord
        .current_user()
        .await
        .context("discord token check failed")?;
    info!(id = %me.id, "Logged in as: {}", me.username);

    // Config guarantees the public key whenever an application id is set.
    let interactions = match (&cfg.discord.application_id, &cfg.discord.public_key) {
        (Some(app_id), Some(public_key)) => {
            let verifier = SignatureVerifier::from_hex(public_key)?;
            if let Err(e) = register_commands(&discord, app_id, &CommandTable::standard()).await {
                warn!("failed to register slash commands: {e}");
            }
            Some(verifier)
        }
        _ => None,
    };

    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        Arc::new(discord),
        ThrottleConfig::default(),
    ));

    let live: Option<Arc<dyn LiveApi>> = match (&cfg.api, cfg.include_active_counts) {
        (Some(api), true) => Some(Arc::new(GolbatApi::new(api)?)),
        _ => None,
    };
    let aggregator = Aggregator::new(Arc::new(MySqlConnector::new(&cfg.database)), live);

    let cancel = CancellationToken::new();
    let scheduler = SummaryScheduler::new(&cfg, aggregator, messenger, state);

    if let Some(verifier) = interactions {
        let endpoint = Arc::new(InteractionState {
            verifier,
            commands: CommandTable::standard(),
            ctx: CommandContext {
                snapshot: scheduler.subscribe(),
                render: RenderOptions::from_config(&cfg),
            },
        });
        let bind = cfg.discord.interactions_bind.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = interactions::serve(&bind, endpoint, cancel).await {
                error!("interactions endpoint stopped: {e}");
            }
        });
    }

    let summary_loop = scheduler.spawn(cancel.clone());

    wait_for_shutdown().await;
    info!("Received signal. Exiting...");
    scheduler::stop(summary_loop, &cancel, SHUTDOWN_GRACE).await;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
              _ = tokio::signal::ctrl_c() => {}
              _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("SIGTERM handler unavailable: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
