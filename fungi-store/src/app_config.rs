use fungi_core::LedgerRules;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub business_rules: LedgerRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: Backend,
    #[serde(default = "default_transaction_attempts")]
    pub transaction_attempts: u32,
}

fn default_transaction_attempts() -> u32 {
    crate::DEFAULT_TRANSACTION_ATTEMPTS
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: i64,
}

fn default_requests_per_minute() -> i64 { 120 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `FUNGI__STORE__BACKEND=postgres`
            .add_source(config::Environment::with_prefix("FUNGI").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
