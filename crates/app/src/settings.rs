//! Settings for the `spendchain` service.
//!
//! Read from an optional `settings.toml` in the working directory, then from
//! `SPENDCHAIN__*` environment variables (`SPENDCHAIN__ENGINE__MAX_ATTEMPTS=8`).
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    #[default]
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Engine {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for Engine {
    fn default() -> Self {
        let defaults = engine::EngineSettings::default();
        Self {
            max_attempts: defaults.max_attempts,
            retry_backoff_ms: defaults.retry_backoff_ms,
        }
    }
}

impl From<&Engine> for engine::EngineSettings {
    fn from(value: &Engine) -> Self {
        Self {
            max_attempts: value.max_attempts.max(1),
            retry_backoff_ms: value.retry_backoff_ms,
        }
    }
}

/// Periodic alert evaluation. Disabled when absent.
#[derive(Debug, Deserialize)]
pub struct Alerts {
    pub interval_secs: u64,
    pub exercises: Vec<i32>,
    #[serde(default = "default_alert_actor")]
    pub actor: String,
}

fn default_alert_actor() -> String {
    "alert-scheduler".to_string()
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub engine: Engine,
    pub alerts: Option<Alerts>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(
                Environment::with_prefix("SPENDCHAIN")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("alerts.exercises")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
