//! Runner configuration

use serde::Deserialize;

use infra_db::DatabaseConfig;

/// Runner configuration, read from `RUNNER_*` variables
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Database URL
    pub database_url: String,
    /// Log level, overridden by `RUST_LOG`
    pub log_level: String,
    /// Pool size
    pub max_connections: u32,
    /// Apply pending migrations on start
    pub run_migrations: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/claims".to_string(),
            log_level: "info".to_string(),
            max_connections: 5,
            run_migrations: false,
        }
    }
}

impl RunnerConfig {
    /// Loads configuration from environment
    ///
    /// A bare `DATABASE_URL` is honoured when `RUNNER_DATABASE_URL` is unset.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_default("database_url", url)?;
        }
        builder
            .add_source(config::Environment::with_prefix("RUNNER"))
            .build()?
            .try_deserialize()
    }

    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .max_connections(self.max_connections)
            .min_connections(1)
    }
}
