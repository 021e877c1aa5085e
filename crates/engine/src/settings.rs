//! Engine configuration.
//!
//! Loaded from an optional TOML file, then from `QUADERNO__*` environment
//! variables (`QUADERNO__RATES__MAX_AGE_HOURS=48`). Every key has a default,
//! so a missing file is not an error.

use serde::Deserialize;

use crate::{ResultEngine, rates::{FrankfurterProvider, OpenErApiProvider}};

const DEFAULT_CONFIG_PATH: &str = "config/engine.toml";
const ENV_PREFIX: &str = "QUADERNO";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rates: RatesSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RatesSettings {
    pub memory_ttl_secs: u64,
    pub max_age_hours: i64,
    pub request_timeout_secs: u64,
    /// Primary provider URL, `{base}` is replaced by the base currency.
    pub primary_url: String,
    /// Fallback provider URL, `{base}` is replaced by the base currency.
    pub fallback_url: String,
}

impl Default for RatesSettings {
    fn default() -> Self {
        Self {
            memory_ttl_secs: 3600,
            max_age_hours: 24,
            request_timeout_secs: 10,
            primary_url: OpenErApiProvider::DEFAULT_URL.to_string(),
            fallback_url: FrankfurterProvider::DEFAULT_URL.to_string(),
        }
    }
}

impl Settings {
    /// Load from `config/engine.toml` and the environment.
    pub fn load() -> ResultEngine<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from `path` (if it exists) and the environment.
    pub fn load_from(path: &str) -> ResultEngine<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
