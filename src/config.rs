//! Process-wide configuration, read from the environment.
//!
//! Each field is `env::var(...).ok().and_then(|v| v.parse().ok())
//! .unwrap_or(default)`, collected into a single struct built once at
//! startup instead of re-reading `env::var` scattered through the
//! codebase.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: String,
    pub jwt_secret: String,
    pub webhook_bearer_token: Option<String>,
    pub webhook_hmac_secret: Option<String>,
    pub webhook_ip_allowlist: Vec<String>,
    pub webhook_replay_window: Duration,
    pub dedup_ttl: Duration,
    pub positioning_tick: Duration,
    pub orchestrator_tick: Duration,
    pub inter_ad_sleep: Duration,
    pub ad_min_update_interval: Duration,
    pub payment_match_window: Duration,
    pub exchange_base_url: String,
    pub exchange_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "p2p_merchant_bot.db".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                "dev-secret-change-in-production-minimum-32-characters".to_string()
            }),
            webhook_bearer_token: env::var("WEBHOOK_BEARER_TOKEN").ok(),
            webhook_hmac_secret: env::var("WEBHOOK_HMAC_SECRET").ok(),
            webhook_ip_allowlist: env::var("WEBHOOK_IP_ALLOWLIST")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            webhook_replay_window: Duration::from_secs(
                env_u64("WEBHOOK_REPLAY_WINDOW_SECS").unwrap_or(300),
            ),
            dedup_ttl: Duration::from_secs(env_u64("WEBHOOK_DEDUP_TTL_SECS").unwrap_or(300)),
            positioning_tick: Duration::from_secs(env_u64("POSITIONING_TICK_SECS").unwrap_or(5)),
            orchestrator_tick: Duration::from_secs(env_u64("ORCHESTRATOR_TICK_SECS").unwrap_or(10)),
            inter_ad_sleep: Duration::from_millis(env_u64("INTER_AD_SLEEP_MS").unwrap_or(100)),
            ad_min_update_interval: Duration::from_secs(
                env_u64("AD_MIN_UPDATE_INTERVAL_SECS").unwrap_or(3),
            ),
            payment_match_window: Duration::from_secs(
                env_u64("PAYMENT_MATCH_WINDOW_MINS").unwrap_or(120) * 60,
            ),
            exchange_base_url: env::var("EXCHANGE_BASE_URL")
                .unwrap_or_else(|_| "https://p2p.exchange.example".to_string()),
            exchange_timeout: Duration::from_secs(env_u64("EXCHANGE_TIMEOUT_SECS").unwrap_or(30)),
        })
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
