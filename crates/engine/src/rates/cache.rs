use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{ActiveValue, DatabaseConnection, prelude::*, sea_query::OnConflict};

use crate::{Currency, EngineError, ResultEngine, exchange_rates, settings::RatesSettings};

use super::{
    FrankfurterProvider, OpenErApiProvider, ProviderError, RateError, RateProvider, provider_rate,
};

const DEFAULT_MEMORY_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_MAX_AGE_HOURS: i64 = 24;

#[derive(Clone, Copy, Debug)]
struct MemoryEntry {
    rate: f64,
    stored_at: Instant,
}

/// Multi-tier exchange rate lookup.
///
/// Tiers, first hit wins:
/// 1. in-process map keyed `FROM_TO`, valid for `memory_ttl`
/// 2. `exchange_rates` row fetched less than `max_age` ago
/// 3. primary provider, then fallback provider (a success is written back to
///    both tiers above)
/// 4. a stored row of any age, logged as stale
///
/// Lookups are directional: `EUR_USD` and `USD_EUR` are separate entries.
pub struct ExchangeRateCache {
    database: DatabaseConnection,
    primary: Arc<dyn RateProvider>,
    fallback: Option<Arc<dyn RateProvider>>,
    memory: DashMap<String, MemoryEntry>,
    memory_ttl: Duration,
    max_age: chrono::Duration,
}

impl std::fmt::Debug for ExchangeRateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRateCache")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|p| p.name().to_string()))
            .field("memory_entries", &self.memory.len())
            .field("memory_ttl", &self.memory_ttl)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

fn cache_key(from: Currency, to: Currency) -> String {
    format!("{from}_{to}")
}

impl ExchangeRateCache {
    /// Return a builder for `ExchangeRateCache`.
    pub fn builder() -> ExchangeRateCacheBuilder {
        ExchangeRateCacheBuilder::default()
    }

    /// Cache backed by the bundled HTTP providers configured in `settings`.
    pub fn from_settings(
        database: DatabaseConnection,
        settings: &RatesSettings,
    ) -> ResultEngine<Self> {
        let timeout = Duration::from_secs(settings.request_timeout_secs);
        let primary = OpenErApiProvider::new(settings.primary_url.clone(), timeout)
            .map_err(|err| EngineError::ExternalProvider(err.to_string()))?;
        let fallback = FrankfurterProvider::new(settings.fallback_url.clone(), timeout)
            .map_err(|err| EngineError::ExternalProvider(err.to_string()))?;

        Self::builder()
            .database(database)
            .primary(Arc::new(primary))
            .fallback(Arc::new(fallback))
            .memory_ttl(Duration::from_secs(settings.memory_ttl_secs))
            .max_age_hours(settings.max_age_hours)
            .build()
    }

    /// Rate to multiply an amount in `from` by to obtain `to`.
    pub async fn rate(&self, from: Currency, to: Currency) -> Result<f64, RateError> {
        if from == to {
            return Ok(1.0);
        }

        let key = cache_key(from, to);
        if let Some(rate) = self.memory_rate(&key) {
            tracing::debug!(pair = %key, rate, "exchange rate served from memory");
            return Ok(rate);
        }

        let stored = match self.stored_rate(from, to).await {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(pair = %key, "failed to read stored exchange rate: {err}");
                None
            }
        };
        if let Some(row) = &stored
            && Utc::now() - row.fetched_at <= self.max_age
        {
            tracing::debug!(pair = %key, rate = row.rate, "exchange rate served from storage");
            self.remember(key, row.rate);
            return Ok(row.rate);
        }

        match self.fetch(from, to).await {
            Ok(rate) => {
                self.remember(key, rate);
                if let Err(err) = self.persist(from, to, rate).await {
                    tracing::warn!(
                        pair = %cache_key(from, to),
                        "failed to store exchange rate: {err}"
                    );
                }
                Ok(rate)
            }
            Err(err) => match stored {
                Some(row) => {
                    tracing::warn!(
                        pair = %key,
                        rate = row.rate,
                        fetched_at = %row.fetched_at,
                        "providers unavailable, using stale exchange rate: {err}"
                    );
                    Ok(row.rate)
                }
                None => Err(RateError::Unavailable {
                    from,
                    to,
                    reason: err.to_string(),
                }),
            },
        }
    }

    /// Drops every in-process entry; stored rows are kept.
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    fn memory_rate(&self, key: &str) -> Option<f64> {
        let entry = self.memory.get(key).map(|entry| *entry)?;
        if entry.stored_at.elapsed() < self.memory_ttl {
            return Some(entry.rate);
        }
        self.memory.remove(key);
        None
    }

    fn remember(&self, key: String, rate: f64) {
        self.memory.insert(
            key,
            MemoryEntry {
                rate,
                stored_at: Instant::now(),
            },
        );
    }

    async fn stored_rate(
        &self,
        from: Currency,
        to: Currency,
    ) -> Result<Option<exchange_rates::Model>, DbErr> {
        exchange_rates::Entity::find_by_id((from.code().to_string(), to.code().to_string()))
            .one(&self.database)
            .await
    }

    /// Primary first, then fallback. At most one attempt each.
    async fn fetch(&self, from: Currency, to: Currency) -> Result<f64, ProviderError> {
        let primary_err = match provider_rate(self.primary.as_ref(), from, to).await {
            Ok(rate) => {
                tracing::info!(
                    provider = self.primary.name(),
                    pair = %cache_key(from, to),
                    rate,
                    "fetched exchange rate"
                );
                return Ok(rate);
            }
            Err(err) => err,
        };

        let Some(fallback) = &self.fallback else {
            return Err(primary_err);
        };
        tracing::info!(
            provider = self.primary.name(),
            pair = %cache_key(from, to),
            "primary rate provider failed, trying {}: {primary_err}",
            fallback.name()
        );

        let rate = provider_rate(fallback.as_ref(), from, to).await?;
        tracing::info!(
            provider = fallback.name(),
            pair = %cache_key(from, to),
            rate,
            "fetched exchange rate"
        );
        Ok(rate)
    }

    async fn persist(&self, from: Currency, to: Currency, rate: f64) -> Result<(), DbErr> {
        let model = exchange_rates::ActiveModel {
            base_currency: ActiveValue::Set(from.code().to_string()),
            target_currency: ActiveValue::Set(to.code().to_string()),
            rate: ActiveValue::Set(rate),
            fetched_at: ActiveValue::Set(Utc::now()),
        };
        exchange_rates::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    exchange_rates::Column::BaseCurrency,
                    exchange_rates::Column::TargetCurrency,
                ])
                .update_columns([exchange_rates::Column::Rate, exchange_rates::Column::FetchedAt])
                .to_owned(),
            )
            .exec_without_returning(&self.database)
            .await?;
        Ok(())
    }
}

/// The builder for `ExchangeRateCache`
#[derive(Default)]
pub struct ExchangeRateCacheBuilder {
    database: DatabaseConnection,
    primary: Option<Arc<dyn RateProvider>>,
    fallback: Option<Arc<dyn RateProvider>>,
    memory_ttl: Option<Duration>,
    max_age_hours: Option<i64>,
}

impl ExchangeRateCacheBuilder {
    /// Pass the database holding the `exchange_rates` table
    pub fn database(mut self, db: DatabaseConnection) -> Self {
        self.database = db;
        self
    }

    /// Provider asked first on a miss (required)
    pub fn primary(mut self, provider: Arc<dyn RateProvider>) -> Self {
        self.primary = Some(provider);
        self
    }

    /// Provider asked when the primary fails
    pub fn fallback(mut self, provider: Arc<dyn RateProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    pub fn memory_ttl(mut self, ttl: Duration) -> Self {
        self.memory_ttl = Some(ttl);
        self
    }

    pub fn max_age_hours(mut self, hours: i64) -> Self {
        self.max_age_hours = Some(hours);
        self
    }

    /// Construct `ExchangeRateCache`
    pub fn build(self) -> ResultEngine<ExchangeRateCache> {
        let primary = self.primary.ok_or_else(|| {
            EngineError::InvalidInput("a primary rate provider is required".to_string())
        })?;
        let max_age_hours = self.max_age_hours.unwrap_or(DEFAULT_MAX_AGE_HOURS);
        if max_age_hours < 0 {
            return Err(EngineError::InvalidInput(
                "max_age_hours must be >= 0".to_string(),
            ));
        }
        Ok(ExchangeRateCache {
            database: self.database,
            primary,
            fallback: self.fallback,
            memory: DashMap::new(),
            memory_ttl: self.memory_ttl.unwrap_or(DEFAULT_MEMORY_TTL),
            max_age: chrono::Duration::hours(max_age_hours),
        })
    }
}
