//! Reporting queries against the Golbat schema.
//!
//! Each query is a free function of `(pool, now)` so it can be run on its own.
//! Grouped rows come back as `(key, count)` pairs and are folded by the pure
//! helpers at the bottom of the file. Unsigned columns are cast to `SIGNED` so
//! they decode as `i64`.

use sqlx::MySqlPool;

use pgn_core::{
    stats::{
        EventStats, GymStats, LevelCount, LureStats, PokemonStats, PokestopStats, RaidStats,
        RewardStats, RocketStats, RouteStats,
    },
    Result,
};

use crate::db_err;

type KeyCount = (i64, i64);

pub async fn pokemon(pool: &MySqlPool, now: i64) -> Result<PokemonStats> {
    let (total, with_iv, hundos, nundos, shinies): (i64, i64, i64, i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), \
                COUNT(iv), \
                COUNT(CASE WHEN iv = 100 THEN 1 END), \
                COUNT(CASE WHEN iv = 0 THEN 1 END), \
                COUNT(CASE WHEN shiny = 1 THEN 1 END) \
         FROM pokemon WHERE expire_timestamp > ?",
    )
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(db_err)?;

    Ok(PokemonStats {
        total,
        with_iv,
        hundos,
        nundos,
        shinies,
    })
}

pub async fn raids(pool: &MySqlPool, now: i64) -> Result<RaidStats> {
    let raids: Vec<KeyCount> = sqlx::query_as(
        "SELECT CAST(raid_level AS SIGNED), COUNT(*) FROM gym \
         WHERE raid_battle_timestamp <= ? AND raid_end_timestamp > ? \
         GROUP BY raid_level ORDER BY raid_level",
    )
    .bind(now)
    .bind(now)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let eggs: Vec<KeyCount> = sqlx::query_as(
        "SELECT CAST(raid_level AS SIGNED), COUNT(*) FROM gym \
         WHERE raid_battle_timestamp > ? \
         GROUP BY raid_level ORDER BY raid_level",
    )
    .bind(now)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    Ok(RaidStats {
        raids: level_counts(&raids),
        eggs: level_counts(&eggs),
    })
}

pub async fn gyms(pool: &MySqlPool) -> Result<GymStats> {
    let rows: Vec<KeyCount> = sqlx::query_as(
        "SELECT CAST(COALESCE(team_id, 0) AS SIGNED), COUNT(*) FROM gym \
         WHERE enabled = 1 AND deleted = 0 GROUP BY team_id",
    )
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    Ok(fold_gyms(&rows))
}

pub async fn pokestops(pool: &MySqlPool) -> Result<PokestopStats> {
    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM pokestop WHERE enabled = 1 AND deleted = 0")
            .fetch_one(pool)
            .await
            .map_err(db_err)?;

    Ok(PokestopStats { total })
}

/// AR quests live in the `quest_*` columns, the non-AR ones in
/// `alternative_quest_*`.
pub async fn rewards(pool: &MySqlPool, now: i64) -> Result<RewardStats> {
    let (ar_quests, non_ar_quests): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(CASE WHEN quest_type IS NOT NULL AND quest_expiry > ? THEN 1 END), \
                COUNT(CASE WHEN alternative_quest_type IS NOT NULL \
                           AND alternative_quest_expiry > ? THEN 1 END) \
         FROM pokestop WHERE deleted = 0",
    )
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(db_err)?;

    Ok(RewardStats {
        ar_quests,
        non_ar_quests,
    })
}

pub async fn lures(pool: &MySqlPool, now: i64) -> Result<LureStats> {
    let rows: Vec<KeyCount> = sqlx::query_as(
        "SELECT CAST(lure_id AS SIGNED), COUNT(*) FROM pokestop \
         WHERE lure_expire_timestamp > ? AND lure_id > 0 \
         GROUP BY lure_id ORDER BY lure_id",
    )
    .bind(now)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    Ok(LureStats {
        lures: level_counts(&rows),
    })
}

pub async fn rockets(pool: &MySqlPool, now: i64) -> Result<RocketStats> {
    let rows: Vec<KeyCount> = sqlx::query_as(
        "SELECT CAST(`character` AS SIGNED), COUNT(*) FROM incident \
         WHERE expiration > ? AND `character` > 0 GROUP BY `character`",
    )
    .bind(now)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    Ok(fold_rockets(&rows))
}

pub async fn events(pool: &MySqlPool, now: i64) -> Result<EventStats> {
    let rows: Vec<KeyCount> = sqlx::query_as(
        "SELECT CAST(display_type AS SIGNED), COUNT(*) FROM incident \
         WHERE expiration > ? AND display_type IN (7, 8, 9) GROUP BY display_type",
    )
    .bind(now)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    Ok(fold_events(&rows))
}

pub async fn routes(pool: &MySqlPool) -> Result<RouteStats> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM route")
        .fetch_one(pool)
        .await
        .map_err(db_err)?;

    Ok(RouteStats { total })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RocketKind {
    Grunt,
    Leader,
    Giovanni,
}

pub fn classify_rocket(character: i64) -> RocketKind {
    match character {
        44 => RocketKind::Giovanni,
        41..=43 => RocketKind::Leader,
        _ => RocketKind::Grunt,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    GoldStop,
    Kecleon,
    Showcase,
}

pub fn classify_event(display_type: i64) -> Option<EventKind> {
    match display_type {
        7 => Some(EventKind::GoldStop),
        8 => Some(EventKind::Kecleon),
        9 => Some(EventKind::Showcase),
        _ => None,
    }
}

/// Ascending by key, empty keys dropped.
pub fn level_counts(rows: &[KeyCount]) -> Vec<LevelCount> {
    let mut out: Vec<LevelCount> = rows
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|&(level, count)| LevelCount { level, count })
        .collect();
    out.sort_by_key(|lc| lc.level);
    out
}

pub fn fold_gyms(rows: &[KeyCount]) -> GymStats {
    let mut gyms = GymStats::default();
    for &(team, count) in rows {
        gyms.total += count;
        match team {
            1 => gyms.mystic += count,
            2 => gyms.valor += count,
            3 => gyms.instinct += count,
            _ => gyms.neutral += count,
        }
    }
    gyms
}

pub fn fold_rockets(rows: &[KeyCount]) -> RocketStats {
    let mut rockets = RocketStats::default();
    for &(character, count) in rows {
        match classify_rocket(character) {
            RocketKind::Grunt => rockets.grunts += count,
            RocketKind::Leader => rockets.leaders += count,
            RocketKind::Giovanni => rockets.giovanni += count,
        }
    }
    rockets
}

pub fn fold_events(rows: &[KeyCount]) -> EventStats {
    let mut events = EventStats::default();
    for &(display_type, count) in rows {
        match classify_event(display_type) {
            Some(EventKind::GoldStop) => events.gold_stops += count,
            Some(EventKind::Kecleon) => events.kecleon += count,
            Some(EventKind::Showcase) => events.showcases += count,
            None => {}
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rocket_characters_are_classified() {
        assert_eq!(classify_rocket(44), RocketKind::Giovanni);
        assert_eq!(classify_rocket(41), RocketKind::Leader);
        assert_eq!(classify_rocket(43), RocketKind::Leader);
        assert_eq!(classify_rocket(4), RocketKind::Grunt);
        assert_eq!(classify_rocket(45), RocketKind::Grunt);
    }

    #[test]
    fn rockets_fold_by_kind() {
        let rockets = fold_rockets(&[(4, 10), (12, 5), (41, 1), (42, 2), (44, 1)]);
        assert_eq!(
            rockets,
            RocketStats {
                grunts: 15,
                leaders: 3,
                giovanni: 1
            }
        );
    }

    #[test]
    fn events_ignore_unknown_display_types() {
        let events = fold_events(&[(7, 3), (8, 1), (9, 2), (1, 50)]);
        assert_eq!(
            events,
            EventStats {
                gold_stops: 3,
                kecleon: 1,
                showcases: 2
            }
        );
    }

    #[test]
    fn gyms_fold_by_team_with_unknown_as_neutral() {
        let gyms = fold_gyms(&[(0, 4), (1, 3), (2, 2), (3, 1), (9, 1)]);
        assert_eq!(gyms.total, 11);
        assert_eq!(gyms.neutral, 5);
        assert_eq!(gyms.mystic, 3);
        assert_eq!(gyms.valor, 2);
        assert_eq!(gyms.instinct, 1);
    }

    #[test]
    fn level_counts_sorted_and_non_empty() {
        let levels = level_counts(&[(5, 2), (1, 7), (3, 0)]);
        assert_eq!(
            levels,
            vec![
                LevelCount { level: 1, count: 7 },
                LevelCount { level: 5, count: 2 }
            ]
        );
    }
}
