//! Environment-driven configuration.
//!
//! `DATABASE_URL` selects the postgres store (absent → in-process memory
//! store); `ANTHROPIC_API_KEY` selects live LLM mode (absent → mock).

use crate::engine::EngineConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub engine: EngineConfig,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = EngineConfig::default();
        AppConfig {
            port: env_var("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env_var("DATABASE_URL"),
            anthropic_api_key: env_var("ANTHROPIC_API_KEY"),
            anthropic_base_url: env_var("ANTHROPIC_BASE_URL"),
            engine: EngineConfig {
                run_timeout_secs: env_var("RUN_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.run_timeout_secs),
                sandbox_timeout_ms: env_var("SANDBOX_TIMEOUT_MS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.sandbox_timeout_ms),
            },
        }
    }
}
