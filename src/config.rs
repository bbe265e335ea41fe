use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::track::PlaylistId;

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub catalog: CatalogConfig,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub voting: VotingConfig,
    pub http: HttpConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// the managed playlist votes are promoted into
    pub playlist_id: PlaylistId,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LedgerConfig {
    pub in_memory: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VotingConfig {
    /// a pending track is promoted once it has more votes than this
    pub promotion_threshold: usize,
    /// pending tracks older than this are dropped from the ledger
    pub retention_days: i64,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            promotion_threshold: 4,
            retention_days: 7,
        }
    }
}

impl VotingConfig {
    /// oldest `added_at` still considered pending at `now`
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.retention_days)
    }
}
