//! Golbat live-data API client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use pgn_core::{
    config::ApiConfig,
    errors::Error,
    stats::{LiveApi, LiveSpawn},
    Result,
};

const SECRET_HEADER: &str = "X-Golbat-Secret";
const SCAN_PATH: &str = "/api/pokemon/scan";

#[derive(Clone, Debug)]
pub struct GolbatApi {
    http: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl GolbatApi {
    pub fn new(cfg: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::External(format!("golbat client build error: {e}")))?;
        Ok(Self {
            http,
            url: cfg.url.trim_end_matches('/').to_string(),
            secret: cfg.secret.clone(),
        })
    }
}

/// Scan body restricting attack, defense and stamina to `min..=max`.
pub fn scan_request(iv_min: u8, iv_max: u8) -> Value {
    let range = json!({ "min": iv_min, "max": iv_max });
    json!({
        "min": { "latitude": -90.0, "longitude": -180.0 },
        "max": { "latitude": 90.0, "longitude": 180.0 },
        "filters": [{
            "atk_iv": range,
            "def_iv": range,
            "sta_iv": range,
        }],
    })
}

#[async_trait]
impl LiveApi for GolbatApi {
    async fn spawns(&self, iv_min: u8, iv_max: u8) -> Result<Vec<LiveSpawn>> {
        let mut req = self
            .http
            .post(format!("{}{SCAN_PATH}", self.url))
            .json(&scan_request(iv_min, iv_max));
        if let Some(secret) = &self.secret {
            req = req.header(SECRET_HEADER, secret);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::External(format!("golbat request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "golbat scan failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let spawns: Vec<LiveSpawn> = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("golbat json error: {e}")))?;
        debug!(iv_min, iv_max, count = spawns.len(), "golbat scan");
        Ok(spawns)
    }
}
