use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::ChannelId, errors::Error, Result};

const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_INTERACTIONS_BIND: &str = "0.0.0.0:8080";
const DEFAULT_EMBED_TITLE: &str = "Overall Stats";
const DEFAULT_MESSAGE_IDS_FILE: &str = "messageIDs.json";
const MAX_PURGE_WINDOW: u8 = 100;

/// Typed configuration for porygon.
#[derive(Clone, Debug)]
pub struct Config {
    pub discord: DiscordConfig,
    pub database: DatabaseConfig,
    pub api: Option<ApiConfig>,

    // Cadence
    pub refresh_interval: Duration,
    pub error_refresh_interval: Duration,

    // Summary behavior
    pub embed_title: String,
    pub delete_old_embeds: bool,
    pub purge_window: u8,
    pub include_active_counts: bool,

    pub message_ids_file: PathBuf,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub token: String,
    pub channel_ids: Vec<ChannelId>,
    /// Enables slash commands; requires `public_key`.
    pub application_id: Option<String>,
    /// Hex ed25519 key used to verify interaction requests.
    pub public_key: Option<String>,
    /// Address the interactions endpoint listens on.
    pub interactions_bind: String,
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

/// Golbat live API, only present when active counts are enabled.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub url: String,
    pub secret: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Discord
        let token = get("DISCORD_TOKEN").ok_or_else(|| required("DISCORD_TOKEN"))?;
        let channel_ids = parse_csv(get("DISCORD_CHANNEL_IDS"))
            .into_iter()
            .map(ChannelId)
            .collect::<Vec<_>>();
        if channel_ids.is_empty() {
            return Err(required("DISCORD_CHANNEL_IDS"));
        }
        if let Some(bad) = channel_ids.iter().find(|c| !is_snowflake(&c.0)) {
            return Err(Error::Config(format!(
                "invalid channel id '{bad}': expected a numeric id"
            )));
        }
        let application_id = get("DISCORD_APPLICATION_ID");
        let public_key = get("DISCORD_PUBLIC_KEY");
        if application_id.is_some() && public_key.is_none() {
            return Err(Error::Config(
                "DISCORD_PUBLIC_KEY is required when DISCORD_APPLICATION_ID is set".to_string(),
            ));
        }
        let interactions_bind =
            get("INTERACTIONS_BIND").unwrap_or_else(|| DEFAULT_INTERACTIONS_BIND.to_string());
        let api_base = get("DISCORD_API_BASE")
            .unwrap_or_else(|| DEFAULT_DISCORD_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        // Database
        let port = match get("DB_PORT") {
            Some(v) => v
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("DB_PORT is not a valid port: {v}")))?,
            None => 3306,
        };
        let database = DatabaseConfig {
            host: get("DB_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            user: get("DB_USER").ok_or_else(|| required("DB_USER"))?,
            password: lookup("DB_PASSWORD").unwrap_or_default(),
            name: get("DB_NAME").ok_or_else(|| required("DB_NAME"))?,
        };

        // Cadence (seconds, never zero)
        let refresh_secs = parse_u64(&get, "REFRESH_INTERVAL")?.unwrap_or(60);
        let error_refresh_secs = parse_u64(&get, "ERROR_REFRESH_INTERVAL")?.unwrap_or(30);
        let refresh_interval = Duration::from_secs(refresh_secs.max(1));
        let error_refresh_interval = Duration::from_secs(error_refresh_secs.max(1));

        let embed_title = get("EMBED_TITLE").unwrap_or_else(|| DEFAULT_EMBED_TITLE.to_string());
        let delete_old_embeds = get("DELETE_OLD_EMBEDS")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);
        let purge_window = parse_u64(&get, "PURGE_WINDOW")?
            .unwrap_or(u64::from(MAX_PURGE_WINDOW))
            .clamp(1, u64::from(MAX_PURGE_WINDOW)) as u8;

        // Live counts need the API.
        let include_active_counts = get("INCLUDE_ACTIVE_COUNTS")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);
        let api = match get("API_URL") {
            Some(url) => Some(ApiConfig {
                url: url.trim_end_matches('/').to_string(),
                secret: get("API_SECRET"),
            }),
            None if include_active_counts => {
                return Err(Error::Config(
                    "API_URL is required when INCLUDE_ACTIVE_COUNTS is enabled".to_string(),
                ))
            }
            None => None,
        };

        let message_ids_file = PathBuf::from(
            get("MESSAGE_IDS_FILE").unwrap_or_else(|| DEFAULT_MESSAGE_IDS_FILE.to_string()),
        );

        Ok(Self {
            discord: DiscordConfig {
                token,
                channel_ids,
                application_id,
                public_key,
                interactions_bind,
                api_base,
            },
            database,
            api,
            refresh_interval,
            error_refresh_interval,
            embed_title,
            delete_old_embeds,
            purge_window,
            include_active_counts,
            message_ids_file,
        })
    }
}

fn required(key: &str) -> Error {
    Error::Config(format!("{key} environment variable is required"))
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    get(key)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("{key} must be a non-negative integer: {v}")))
        })
        .transpose()
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn is_snowflake(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
