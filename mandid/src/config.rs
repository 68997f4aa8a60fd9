//! Application configuration management.
//!
//! Configuration is merged from default values, an optional TOML file and
//! environment variables, in increasing order of precedence.

use crate::Cli;
use mandi_core::models::MarketConfig;
use mandi_engine::RetryPolicy;
use mandi_sqlite::config::SqliteConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// The main application configuration that composes all component configs
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    /// Where the store lives
    #[serde(default)]
    pub database: SqliteConfig,

    /// Auction, pooling, settlement and dispute policy
    #[serde(default)]
    pub market: MarketConfig,

    /// How the calendar is driven
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Timing of the scheduler loop and its store retries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often to run a tick
    #[serde(with = "humantime_serde")]
    pub every: Duration,
    /// Total tries of a failing store operation within one tick
    pub retries: usize,
    /// Delay before the first retry; later ones double
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Cap on a single retry delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            every: Duration::from_secs(1),
            retries: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl SchedulerConfig {
    /// The backoff the engine uses for store failures
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.base_delay, self.max_delay, 0.2)
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file given by the CLI
    /// 3. Default values (lowest priority)
    ///
    /// Environment variables are mapped using the pattern
    /// `APP_<SECTION>__<KEY>` to `<section>.<key>`, nesting further with
    /// each `__`:
    ///
    /// ```bash
    /// export APP_DATABASE__DATABASE_PATH="/var/lib/mandi/mandi.db"
    /// export APP_SCHEDULER__EVERY="500ms"
    /// export APP_MARKET__DISPUTE__WINDOW="48h"
    /// ```
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        Self::load_from(cli.config.as_deref())
    }

    /// As [`AppConfig::load`], with the file given directly
    pub fn load_from(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if path.exists() {
                config = config.add_source(config::File::from(path))
            } else {
                return Err(anyhow::anyhow!(
                    "Config file {} does not exist",
                    path.display()
                ));
            }
        }

        config = config.add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let built_config = config.build()?;
        built_config.try_deserialize().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn a_file_overrides_the_defaults() -> anyhow::Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            r#"
[database]
database_path = "mandi.db"

[scheduler]
every = "5s"

[market.auction]
max_attempts = 5
grace = "10m"

[market.settlement]
require_buyer_funds = true
"#
        )?;

        let config = AppConfig::load_from(Some(file.path()))?;
        assert_eq!(
            config.database.database_path.as_deref(),
            Some(Path::new("mandi.db"))
        );
        assert_eq!(config.scheduler.every, Duration::from_secs(5));
        assert_eq!(config.scheduler.retries, 3);
        assert_eq!(config.market.auction.max_attempts, 5);
        assert_eq!(config.market.auction.grace, Duration::from_secs(600));
        assert_eq!(config.market.auction.backoff_factor, 2);
        assert!(config.market.settlement.require_buyer_funds);
        Ok(())
    }

    #[test]
    fn a_missing_file_is_an_error() {
        assert!(AppConfig::load_from(Some(Path::new("/nonexistent/mandi.toml"))).is_err());
    }
}
