use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`
    pub path: String,
    pub timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "chatvault.db".to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub url: String,
    pub index_name: String,
    pub timeout_ms: u64,
    /// Make upserts visible to the next query before acknowledging them
    pub refresh_on_write: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index_name: "chat_histories".to_string(),
            timeout_ms: 2_000,
            refresh_on_write: true,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub channel_buffer_size: usize,
    pub upsert_timeout_ms: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 256,
            upsert_timeout_ms: 2_000,
            max_retries: 3,
            base_backoff_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Config::builder()
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("CHATVAULT").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Settings suitable for tests: in-memory SQLite and short timeouts.
    pub fn ephemeral() -> Self {
        let mut settings = Self::default();
        settings.database.path = ":memory:".to_string();
        settings.database.timeout_ms = 1_000;
        settings.search.timeout_ms = 200;
        settings.sync.upsert_timeout_ms = 200;
        settings.sync.max_retries = 1;
        settings.sync.base_backoff_ms = 10;
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let settings: Settings = Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.search.index_name, "chat_histories");
        assert_eq!(settings.pagination.default_limit, 10);
        assert!(settings.search.refresh_on_write);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let settings: Settings = Config::builder()
            .set_override("search.timeout_ms", 50)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.search.timeout_ms, 50);
        assert_eq!(settings.search.url, "http://localhost:9200");
        assert_eq!(settings.sync.max_retries, 3);
    }
}
