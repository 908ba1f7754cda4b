use std::env;

use cl_common::Secret;
use log::*;

const DEFAULT_CARDLINK_HOST: &str = "127.0.0.1";
const DEFAULT_CARDLINK_PORT: u16 = 8360;
/// The default commission rate, in basis points of the discount (5%).
const DEFAULT_COMMISSION_BPS: i64 = 500;
/// How often the background sweep runs, in seconds.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
/// How long to wait on the ranking collaborator before giving up on a call.
const DEFAULT_RANKING_TIMEOUT_MS: u64 = 5_000;
/// Consecutive ranking failures before the circuit opens.
const DEFAULT_RANKING_FAILURE_THRESHOLD: u32 = 3;
/// How long an open ranking circuit stays open, in seconds.
const DEFAULT_RANKING_COOLDOWN_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The platform's cut of every discount, in basis points.
    pub commission_bps: i64,
    /// How often the background expiry sweep runs.
    pub sweep_interval_secs: u64,
    pub ranking: RankingConfig,
}

/// Configuration for the external ranking collaborator. When `base_url` is `None`, matching runs purely on the
/// local heuristic.
#[derive(Clone, Debug, Default)]
pub struct RankingConfig {
    pub base_url: Option<String>,
    /// Bearer token for the collaborator, when its deployment requires one.
    pub api_key: Option<Secret<String>>,
    pub timeout_ms: u64,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CARDLINK_HOST.to_string(),
            port: DEFAULT_CARDLINK_PORT,
            database_url: String::default(),
            commission_bps: DEFAULT_COMMISSION_BPS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            ranking: RankingConfig {
                base_url: None,
                api_key: None,
                timeout_ms: DEFAULT_RANKING_TIMEOUT_MS,
                failure_threshold: DEFAULT_RANKING_FAILURE_THRESHOLD,
                cooldown_secs: DEFAULT_RANKING_COOLDOWN_SECS,
            },
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("CARDLINK_HOST").ok().unwrap_or_else(|| DEFAULT_CARDLINK_HOST.into());
        let port = env::var("CARDLINK_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for CARDLINK_PORT. {e} Using the default, \
                         {DEFAULT_CARDLINK_PORT}, instead."
                    );
                    DEFAULT_CARDLINK_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_CARDLINK_PORT);
        let database_url = env::var("CARDLINK_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ CARDLINK_DATABASE_URL is not set. Please set it to the URL for the Cardlink database.");
            String::default()
        });
        let commission_bps = env::var("CARDLINK_COMMISSION_BPS")
            .ok()
            .and_then(|s| {
                s.parse::<i64>()
                    .map_err(|e| {
                        error!("🪛️ {s} is not a valid value for CARDLINK_COMMISSION_BPS. {e}");
                        e
                    })
                    .ok()
            })
            .filter(|bps| {
                let valid = (0..=10_000).contains(bps);
                if !valid {
                    error!("🪛️ CARDLINK_COMMISSION_BPS must be between 0 and 10000. Using the default.");
                }
                valid
            })
            .unwrap_or(DEFAULT_COMMISSION_BPS);
        let sweep_interval_secs = env::var("CARDLINK_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        let ranking = RankingConfig::from_env_or_default();
        Self { host, port, database_url, commission_bps, sweep_interval_secs, ranking }
    }
}

impl RankingConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = env::var("CARDLINK_RANKING_URL").ok().filter(|s| !s.trim().is_empty());
        if base_url.is_none() {
            info!("🪛️ CARDLINK_RANKING_URL is not set. Matching will use the local heuristic only.");
        }
        let api_key = env::var("CARDLINK_RANKING_API_KEY").ok().filter(|s| !s.trim().is_empty()).map(Secret::new);
        let timeout_ms = env::var("CARDLINK_RANKING_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RANKING_TIMEOUT_MS);
        let failure_threshold = env::var("CARDLINK_RANKING_FAILURE_THRESHOLD")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RANKING_FAILURE_THRESHOLD);
        let cooldown_secs = env::var("CARDLINK_RANKING_COOLDOWN_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RANKING_COOLDOWN_SECS);
        Self { base_url, api_key, timeout_ms, failure_threshold, cooldown_secs }
    }
}
