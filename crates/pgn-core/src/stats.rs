//! Stats aggregation.
//!
//! One aggregation call per cycle produces either a complete
//! [`AggregateSnapshot`] or an [`AggregationFailure`] naming the stage that
//! failed. Sub-queries live behind [`StatsQueries`] so each one can be run and
//! tested on its own.

use std::{collections::HashSet, fmt, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{Error, Result};

/// Count of active objects at one level (raid level, lure kind, ...).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LevelCount {
    pub level: i64,
    pub count: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PokemonStats {
    pub total: i64,
    pub with_iv: i64,
    pub hundos: i64,
    pub nundos: i64,
    pub shinies: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RaidStats {
    pub raids: Vec<LevelCount>,
    pub eggs: Vec<LevelCount>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GymStats {
    pub total: i64,
    pub neutral: i64,
    pub mystic: i64,
    pub valor: i64,
    pub instinct: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PokestopStats {
    pub total: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewardStats {
    pub ar_quests: i64,
    pub non_ar_quests: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LureStats {
    /// Keyed by lure item id.
    pub lures: Vec<LevelCount>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RocketStats {
    pub grunts: i64,
    pub leaders: i64,
    pub giovanni: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventStats {
    pub gold_stops: i64,
    pub kecleon: i64,
    pub showcases: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteStats {
    pub total: i64,
}

/// Distinct live spawns from the cross-check API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActiveCounts {
    pub hundos: usize,
    pub nundos: usize,
}

/// Everything gathered in one cycle. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregateSnapshot {
    pub pokemon: PokemonStats,
    pub raids: RaidStats,
    pub gyms: GymStats,
    pub pokestops: PokestopStats,
    pub rewards: RewardStats,
    pub lures: LureStats,
    pub rockets: RocketStats,
    pub events: EventStats,
    pub routes: RouteStats,
    pub active: Option<ActiveCounts>,
}

/// One datastore session's worth of read-only reporting queries.
#[async_trait]
pub trait StatsQueries: Send + Sync {
    async fn pokemon(&self) -> Result<PokemonStats>;
    async fn raids(&self) -> Result<RaidStats>;
    async fn gyms(&self) -> Result<GymStats>;
    async fn pokestops(&self) -> Result<PokestopStats>;
    async fn rewards(&self) -> Result<RewardStats>;
    async fn lures(&self) -> Result<LureStats>;
    async fn rockets(&self) -> Result<RocketStats>;
    async fn events(&self) -> Result<EventStats>;
    async fn routes(&self) -> Result<RouteStats>;

    /// Release the session. Failures here are not interesting to the caller.
    async fn close(&self) {}
}

/// Opens a datastore session; called once per cycle.
#[async_trait]
pub trait StatsConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StatsQueries>>;
}

/// A spawn reported by the live API. Only the spawn id matters here.
///
/// Encounters without a spawnpoint (lures, nearby) report `"spawn_id": null`
/// or omit the key.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct LiveSpawn {
    #[serde(default)]
    pub spawn_id: Option<i64>,
}

/// Live-data API used for the optional active-count cross-check.
#[async_trait]
pub trait LiveApi: Send + Sync {
    /// Spawns whose attack, defense and stamina IVs all lie in `min..=max`.
    async fn spawns(&self, iv_min: u8, iv_max: u8) -> Result<Vec<LiveSpawn>>;
}

/// Stage of an aggregation, used to tag failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregationStage {
    Connect,
    Pokemon,
    Raids,
    Gyms,
    Pokestops,
    Rewards,
    Lures,
    Rockets,
    Events,
    Routes,
    ActiveCounts,
}

impl AggregationStage {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationStage::Connect => "connect",
            AggregationStage::Pokemon => "pokemon",
            AggregationStage::Raids => "raids",
            AggregationStage::Gyms => "gyms",
            AggregationStage::Pokestops => "pokestops",
            AggregationStage::Rewards => "rewards",
            AggregationStage::Lures => "lures",
            AggregationStage::Rockets => "rockets",
            AggregationStage::Events => "events",
            AggregationStage::Routes => "routes",
            AggregationStage::ActiveCounts => "active_counts",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("aggregation failed at {stage}: {source}")]
pub struct AggregationFailure {
    pub stage: AggregationStage,
    #[source]
    pub source: Error,
}

impl AggregationFailure {
    fn at(stage: AggregationStage) -> impl FnOnce(Error) -> Self {
        move |source| Self { stage, source }
    }
}

const HUNDO_IV: u8 = 15;
const NUNDO_IV: u8 = 0;

/// Runs every sub-query in order and folds the results into one snapshot.
#[derive(Clone)]
pub struct Aggregator {
    connector: Arc<dyn StatsConnector>,
    live: Option<Arc<dyn LiveApi>>,
}

impl Aggregator {
    pub fn new(connector: Arc<dyn StatsConnector>, live: Option<Arc<dyn LiveApi>>) -> Self {
        Self { connector, live }
    }

    pub async fn aggregate(&self) -> std::result::Result<AggregateSnapshot, AggregationFailure> {
        let start = Instant::now();

        let queries = self
            .connector
            .connect()
            .await
            .map_err(AggregationFailure::at(AggregationStage::Connect))?;
        let gathered = self.gather(queries.as_ref()).await;
        queries.close().await;

        let mut snapshot = gathered?;
        if let Some(live) = &self.live {
            snapshot.active = Some(
                active_counts(live.as_ref())
                    .await
                    .map_err(AggregationFailure::at(AggregationStage::ActiveCounts))?,
            );
        }

        info!("Fetched stats in {:?}", start.elapsed());
        Ok(snapshot)
    }

    async fn gather(
        &self,
        q: &dyn StatsQueries,
    ) -> std::result::Result<AggregateSnapshot, AggregationFailure> {
        use AggregationStage as S;

        Ok(AggregateSnapshot {
            pokemon: q.pokemon().await.map_err(AggregationFailure::at(S::Pokemon))?,
            raids: q.raids().await.map_err(AggregationFailure::at(S::Raids))?,
            gyms: q.gyms().await.map_err(AggregationFailure::at(S::Gyms))?,
            pokestops: q
                .pokestops()
                .await
                .map_err(AggregationFailure::at(S::Pokestops))?,
            rewards: q.rewards().await.map_err(AggregationFailure::at(S::Rewards))?,
            lures: q.lures().await.map_err(AggregationFailure::at(S::Lures))?,
            rockets: q.rockets().await.map_err(AggregationFailure::at(S::Rockets))?,
            events: q.events().await.map_err(AggregationFailure::at(S::Events))?,
            routes: q.routes().await.map_err(AggregationFailure::at(S::Routes))?,
            active: None,
        })
    }
}

/// Hundo and nundo counts, each deduplicated by spawn id.
pub async fn active_counts(live: &dyn LiveApi) -> Result<ActiveCounts> {
    let hundos = distinct_spawns(&live.spawns(HUNDO_IV, HUNDO_IV).await?);
    let nundos = distinct_spawns(&live.spawns(NUNDO_IV, NUNDO_IV).await?);
    debug!(hundos, nundos, "live active counts");
    Ok(ActiveCounts { hundos, nundos })
}

/// Id-less spawns all count as spawn `0`, so together they add at most one.
pub fn distinct_spawns(spawns: &[LiveSpawn]) -> usize {
    spawns
        .iter()
        .map(|s| s.spawn_id.unwrap_or(0))
        .collect::<HashSet<_>>()
        .len()
}

impl fmt::Display for AggregationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{FakeLive, FakeStats};
    use super::*;

    fn sample_snapshot() -> AggregateSnapshot {
        AggregateSnapshot {
            pokemon: PokemonStats {
                total: 10,
                with_iv: 8,
                hundos: 1,
                nundos: 0,
                shinies: 2,
            },
            gyms: GymStats {
                total: 4,
                neutral: 1,
                mystic: 1,
                valor: 1,
                instinct: 1,
            },
            ..AggregateSnapshot::default()
        }
    }

    #[tokio::test]
    async fn aggregate_collects_every_query_and_closes() {
        let stats = Arc::new(FakeStats {
            snapshot: sample_snapshot(),
            ..FakeStats::default()
        });
        let agg = Aggregator::new(stats.clone(), None);

        let snapshot = agg.aggregate().await.unwrap();
        assert_eq!(snapshot, sample_snapshot());
        assert!(snapshot.active.is_none());
        assert_eq!(
            stats.calls(),
            vec![
                "pokemon",
                "raids",
                "gyms",
                "pokestops",
                "rewards",
                "lures",
                "rockets",
                "events",
                "routes",
                "close"
            ]
        );
    }

    #[tokio::test]
    async fn first_failing_query_aborts_the_rest() {
        let stats = Arc::new(FakeStats {
            fail_at: Some(AggregationStage::Gyms),
            ..FakeStats::default()
        });
        let agg = Aggregator::new(stats.clone(), None);

        let err = agg.aggregate().await.unwrap_err();
        assert_eq!(err.stage, AggregationStage::Gyms);
        assert_eq!(stats.calls(), vec!["pokemon", "raids", "gyms", "close"]);
    }

    #[tokio::test]
    async fn connect_failure_is_tagged() {
        let stats = Arc::new(FakeStats {
            fail_connect: true,
            ..FakeStats::default()
        });
        let err = Aggregator::new(stats.clone(), None)
            .aggregate()
            .await
            .unwrap_err();
        assert_eq!(err.stage, AggregationStage::Connect);
        assert!(stats.calls().is_empty());
        assert!(err.to_string().contains("connect"));
    }

    #[tokio::test]
    async fn active_counts_deduplicate_spawn_ids() {
        let stats = Arc::new(FakeStats::default());
        let live = Arc::new(FakeLive {
            hundo_ids: vec![7, 7, 9],
            nundo_ids: vec![3],
            fail: false,
        });

        let snapshot = Aggregator::new(stats, Some(live))
            .aggregate()
            .await
            .unwrap();
        assert_eq!(
            snapshot.active,
            Some(ActiveCounts {
                hundos: 2,
                nundos: 1
            })
        );
    }

    #[tokio::test]
    async fn live_api_failure_fails_whole_aggregation() {
        let stats = Arc::new(FakeStats::default());
        let live = Arc::new(FakeLive {
            fail: true,
            ..FakeLive::default()
        });

        let err = Aggregator::new(stats, Some(live))
            .aggregate()
            .await
            .unwrap_err();
        assert_eq!(err.stage, AggregationStage::ActiveCounts);
    }

    #[test]
    fn live_spawn_without_id_defaults_to_zero() {
        let spawns: Vec<LiveSpawn> =
            serde_json::from_str(r#"[{"spawn_id": 5, "iv": 100}, {"iv": 100}, {}]"#).unwrap();
        assert_eq!(distinct_spawns(&spawns), 2);
    }

    #[test]
    fn null_spawn_ids_decode_and_share_one_bucket() {
        let spawns: Vec<LiveSpawn> = serde_json::from_str(
            r#"[{"spawn_id": 1}, {"spawn_id": null}, {"id": "x"}, {"spawn_id": null}]"#,
        )
        .unwrap();
        assert_eq!(spawns.len(), 4);
        assert_eq!(spawns[1], LiveSpawn { spawn_id: None });
        assert_eq!(distinct_spawns(&spawns), 2);
    }
}
