use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::scheduler::Recurrence;
use crate::webhook::DEFAULT_TIMEOUT;

/// Upper bound for `nonce_lifetime_secs` (one week).
pub const MAX_NONCE_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Identity of this site, sent as `site_url` in every payload.
    pub site_url: String,
    pub listen: SocketAddr,
    pub state_path: PathBuf,
    pub components_path: PathBuf,
    pub updates_path: PathBuf,
    /// Seeds for the stored webhook URLs. Unset leaves the stored value alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_webhook_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub admin_token: String,
    pub webhook_timeout_secs: u64,
    pub report_recurrence: Recurrence,
    pub nonce_lifetime_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_url: "http://localhost".into(),
            listen: SocketAddr::from(([127, 0, 0, 1], 8787)),
            state_path: "verhook-state.json".into(),
            components_path: "components.json".into(),
            updates_path: "updates.json".into(),
            webhook_url: None,
            daily_webhook_url: None,
            admin_token: String::new(),
            webhook_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            report_recurrence: Recurrence::Daily,
            nonce_lifetime_secs: 24 * 60 * 60,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("verhook.toml"))
            .merge(Json::file("verhook.json"))
            .merge(Env::prefixed("VERHOOK_"))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // Support Docker-style secrets
        if let Ok(token_file) = std::env::var("VERHOOK_ADMIN_TOKEN_FILE") {
            config.admin_token = std::fs::read_to_string(token_file)?.trim().to_string();
        }

        if config.webhook_timeout_secs == 0 {
            anyhow::bail!("webhook_timeout_secs must be greater than zero");
        }
        if !(1..=MAX_NONCE_LIFETIME_SECS).contains(&config.nonce_lifetime_secs) {
            anyhow::bail!(
                "nonce_lifetime_secs must be between 1 and {}",
                MAX_NONCE_LIFETIME_SECS
            );
        }
        config.site_url = config.site_url.trim_end_matches('/').to_string();

        Ok(config)
    }
}
