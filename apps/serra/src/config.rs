//! # Server Configuration
//!
//! Every option is a `serve` flag with an environment fallback.

use clap::Args;
use serra_core::condition::DEFAULT_STALE_AFTER_SECS;
use std::net::SocketAddr;

/// Default CORS origins (the local dashboard dev server).
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";

#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "SERRA_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Seconds between scheduler ticks.
    #[arg(long, env = "SERRA_RULE_TICK_SECONDS", default_value_t = 30)]
    pub rule_tick_seconds: u64,

    /// Age after which a sensor reading is ignored by rules.
    #[arg(long, env = "SERRA_SENSOR_STALE_SECONDS", default_value_t = DEFAULT_STALE_AFTER_SECS)]
    pub sensor_stale_seconds: u64,

    /// Require this key on every API request (X-API-Key or Bearer).
    #[arg(long, env = "SERRA_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the device bridge. Outlets are simulated when unset.
    #[arg(long, env = "SERRA_BRIDGE_URL")]
    pub bridge_url: Option<String>,

    /// Requests per second across the whole API; 0 disables the limit.
    #[arg(long, env = "SERRA_RATE_LIMIT", default_value_t = 50)]
    pub rate_limit: u32,

    /// Comma separated list of allowed CORS origins.
    #[arg(long, env = "SERRA_CORS_ORIGINS", default_value = DEFAULT_CORS_ORIGINS)]
    pub cors_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            rule_tick_seconds: 30,
            sensor_stale_seconds: DEFAULT_STALE_AFTER_SECS,
            api_key: None,
            bridge_url: None,
            rate_limit: 50,
            cors_origins: DEFAULT_CORS_ORIGINS.to_string(),
        }
    }
}

impl ServerConfig {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.rule_tick_seconds == 0 {
            return Err("rule tick must be at least 1 second".into());
        }
        if self.sensor_stale_seconds == 0 {
            return Err("sensor staleness window must be at least 1 second".into());
        }
        if self.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err("API key must not be blank".into());
        }
        if let Some(url) = &self.bridge_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("bridge URL must be http(s), got '{url}'"));
            }
        }
        Ok(())
    }

    /// Parsed CORS origins, blanks dropped.
    #[must_use]
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}
