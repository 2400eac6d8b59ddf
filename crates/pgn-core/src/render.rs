//! Snapshot -> display fields.

use chrono::{DateTime, Utc};

use crate::{
    config::Config,
    messaging::types::{DisplayField, SummaryContent},
    stats::{AggregateSnapshot, LevelCount},
};

#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub title: String,
    pub include_active_counts: bool,
}

impl RenderOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            title: cfg.embed_title.clone(),
            include_active_counts: cfg.include_active_counts,
        }
    }
}

pub fn render_summary(
    snapshot: &AggregateSnapshot,
    opts: &RenderOptions,
    now: DateTime<Utc>,
) -> SummaryContent {
    SummaryContent::new(opts.title.clone(), render_fields(snapshot, opts), now)
}

pub fn render_fields(s: &AggregateSnapshot, opts: &RenderOptions) -> Vec<DisplayField> {
    let mut fields = Vec::with_capacity(12);

    fields.push(DisplayField::new(
        "Pokemon",
        lines(&[
            ("Active", s.pokemon.total),
            ("With IV", s.pokemon.with_iv),
            ("Hundos", s.pokemon.hundos),
            ("Nundos", s.pokemon.nundos),
            ("Shiny", s.pokemon.shinies),
        ]),
        true,
    ));

    if opts.include_active_counts {
        if let Some(active) = s.active {
            fields.push(DisplayField::new(
                "Live Checked",
                lines(&[
                    ("Hundos", active.hundos as i64),
                    ("Nundos", active.nundos as i64),
                ]),
                true,
            ));
        }
    }

    fields.push(DisplayField::new(
        "Gyms",
        lines(&[
            ("Total", s.gyms.total),
            ("Neutral", s.gyms.neutral),
            ("Mystic", s.gyms.mystic),
            ("Valor", s.gyms.valor),
            ("Instinct", s.gyms.instinct),
        ]),
        true,
    ));
    fields.push(DisplayField::new("Raids", by_level(&s.raids.raids, "Level"), true));
    fields.push(DisplayField::new("Eggs", by_level(&s.raids.eggs, "Level"), true));
    fields.push(DisplayField::new(
        "Pokestops",
        format_count(s.pokestops.total),
        true,
    ));
    fields.push(DisplayField::new(
        "Quests",
        lines(&[("AR", s.rewards.ar_quests), ("Non-AR", s.rewards.non_ar_quests)]),
        true,
    ));

    let lures = if s.lures.lures.is_empty() {
        "None".to_string()
    } else {
        s.lures
            .lures
            .iter()
            .map(|l| format!("{}: {}", lure_name(l.level), format_count(l.count)))
            .collect::<Vec<_>>()
            .join("\n")
    };
    fields.push(DisplayField::new("Lures", lures, true));

    fields.push(DisplayField::new(
        "Team Rocket",
        lines(&[
            ("Grunts", s.rockets.grunts),
            ("Leaders", s.rockets.leaders),
            ("Giovanni", s.rockets.giovanni),
        ]),
        true,
    ));
    fields.push(DisplayField::new(
        "Events",
        lines(&[
            ("Gold Stops", s.events.gold_stops),
            ("Kecleon", s.events.kecleon),
            ("Showcases", s.events.showcases),
        ]),
        true,
    ));
    fields.push(DisplayField::new("Routes", format_count(s.routes.total), true));

    fields
}

/// Plain-text rendering for command replies.
pub fn render_text(snapshot: &AggregateSnapshot, opts: &RenderOptions) -> String {
    let mut out = format!("**{}**", opts.title);
    for f in render_fields(snapshot, opts) {
        out.push_str(&format!("\n\n__{}__\n{}", f.name, f.value));
    }
    out
}

fn lines(rows: &[(&str, i64)]) -> String {
    rows.iter()
        .map(|(label, n)| format!("{label}: {}", format_count(*n)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn by_level(counts: &[LevelCount], label: &str) -> String {
    if counts.is_empty() {
        return "None".to_string();
    }
    counts
        .iter()
        .map(|c| format!("{label} {}: {}", c.level, format_count(c.count)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn lure_name(item_id: i64) -> String {
    match item_id {
        501 => "Normal".to_string(),
        502 => "Glacial".to_string(),
        503 => "Mossy".to_string(),
        504 => "Magnetic".to_string(),
        505 => "Rainy".to_string(),
        506 => "Golden".to_string(),
        other => format!("Lure {other}"),
    }
}

/// `1234567` -> `1,234,567`.
pub fn format_count(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
