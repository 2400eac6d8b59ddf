//! Golbat adapters for the stats ports.
//!
//! - [`MySqlConnector`] / [`MySqlStats`]: read-only reporting queries against
//!   the scanner database
//! - [`api::GolbatApi`]: live-data API used for the active-count cross-check

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use tracing::debug;

use pgn_core::{
    config::DatabaseConfig,
    errors::Error,
    stats::{
        EventStats, GymStats, LureStats, PokemonStats, PokestopStats, RaidStats, RewardStats,
        RocketStats, RouteStats, StatsConnector, StatsQueries,
    },
    Result,
};

pub mod api;
pub mod queries;

pub use api::GolbatApi;

const MAX_CONNECTIONS: u32 = 2;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn db_err(e: sqlx::Error) -> Error {
    Error::Datastore(e.to_string())
}

/// Opens a fresh pool per cycle so a database restart never wedges the loop.
#[derive(Clone)]
pub struct MySqlConnector {
    options: MySqlConnectOptions,
}

impl MySqlConnector {
    pub fn new(cfg: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.name);
        Self { options }
    }
}

#[async_trait]
impl StatsConnector for MySqlConnector {
    async fn connect(&self) -> Result<Box<dyn StatsQueries>> {
        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(self.options.clone())
            .await
            .map_err(db_err)?;
        debug!("database pool opened");
        Ok(Box::new(MySqlStats::new(pool)))
    }
}

/// One cycle's session. "Active" is judged against the time the session opened
/// so every query sees the same cut-off.
pub struct MySqlStats {
    pool: MySqlPool,
    now: i64,
}

impl MySqlStats {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            now: Utc::now().timestamp(),
        }
    }
}

#[async_trait]
impl StatsQueries for MySqlStats {
    async fn pokemon(&self) -> Result<PokemonStats> {
        queries::pokemon(&self.pool, self.now).await
    }

    async fn raids(&self) -> Result<RaidStats> {
        queries::raids(&self.pool, self.now).await
    }

    async fn gyms(&self) -> Result<GymStats> {
        queries::gyms(&self.pool).await
    }

    async fn pokestops(&self) -> Result<PokestopStats> {
        queries::pokestops(&self.pool).await
    }

    async fn rewards(&self) -> Result<RewardStats> {
        queries::rewards(&self.pool, self.now).await
    }

    async fn lures(&self) -> Result<LureStats> {
        queries::lures(&self.pool, self.now).await
    }

    async fn rockets(&self) -> Result<RocketStats> {
        queries::rockets(&self.pool, self.now).await
    }

    async fn events(&self) -> Result<EventStats> {
        queries::events(&self.pool, self.now).await
    }

    async fn routes(&self) -> Result<RouteStats> {
        queries::routes(&self.pool).await
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("database pool closed");
    }
}
