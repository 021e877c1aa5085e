use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    ConversionBatcher, ConversionRequest, Currency, EngineError, ExchangeRateCache,
    ProviderError, RateError, RateProvider,
};
use migration::MigratorTrait;

/// Serves fixed rates and counts how often it was asked.
struct CountingProvider {
    name: &'static str,
    rates: HashMap<(&'static str, &'static str), f64>,
    healthy: bool,
    calls: AtomicUsize,
}

impl CountingProvider {
    fn new(name: &'static str, rates: &[(&'static str, &'static str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            name,
            rates: rates.iter().map(|&(b, t, r)| ((b, t), r)).collect(),
            healthy: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn down(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            rates: HashMap::new(),
            healthy: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateProvider for CountingProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn latest(&self, base: Currency) -> Result<HashMap<String, f64>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy {
            return Err(ProviderError::Http("503 Service Unavailable".to_string()));
        }
        Ok(self
            .rates
            .iter()
            .filter(|((b, _), _)| *b == base.code())
            .map(|((_, t), r)| (t.to_string(), *r))
            .collect())
    }
}

async fn migrated_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

fn cache(
    db: &DatabaseConnection,
    primary: Arc<CountingProvider>,
    fallback: Option<Arc<CountingProvider>>,
) -> ExchangeRateCache {
    let mut builder = ExchangeRateCache::builder()
        .database(db.clone())
        .primary(primary);
    if let Some(fallback) = fallback {
        builder = builder.fallback(fallback);
    }
    builder.build().unwrap()
}

fn gbp() -> Currency {
    Currency::try_from("GBP").unwrap()
}

fn jpy() -> Currency {
    Currency::try_from("JPY").unwrap()
}

async fn store_rate(db: &DatabaseConnection, from: &str, to: &str, rate: f64, age_hours: i64) {
    db.execute(Statement::from_sql_and_values(
        db.get_database_backend(),
        "INSERT INTO exchange_rates (base_currency, target_currency, rate, fetched_at) \
         VALUES (?, ?, ?, ?)",
        vec![
            from.into(),
            to.into(),
            rate.into(),
            (Utc::now() - Duration::hours(age_hours)).into(),
        ],
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn identity_conversion_makes_no_provider_calls() {
    let db = migrated_db().await;
    let primary = CountingProvider::new("primary", &[]);
    let batcher = ConversionBatcher::new(Arc::new(cache(&db, primary.clone(), None)));

    let converted = batcher.convert(12_345, Currency::EUR, Currency::EUR).await.unwrap();
    assert_eq!(converted.rate, 1.0);
    assert_eq!(converted.converted_minor, 12_345);
    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn repeat_lookups_are_served_from_memory() {
    let db = migrated_db().await;
    let primary = CountingProvider::new("primary", &[("USD", "EUR", 0.9)]);
    let cache = cache(&db, primary.clone(), None);

    assert_eq!(cache.rate(Currency::USD, Currency::EUR).await.unwrap(), 0.9);
    assert_eq!(cache.rate(Currency::USD, Currency::EUR).await.unwrap(), 0.9);
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn stored_rates_outlive_the_memory_tier() {
    let db = migrated_db().await;
    let primary = CountingProvider::new("primary", &[("USD", "EUR", 0.9)]);
    let cache = cache(&db, primary.clone(), None);

    cache.rate(Currency::USD, Currency::EUR).await.unwrap();
    cache.clear_memory();
    assert_eq!(cache.rate(Currency::USD, Currency::EUR).await.unwrap(), 0.9);
    assert_eq!(primary.calls(), 1);

    let row = db
        .query_one(Statement::from_string(
            db.get_database_backend(),
            "SELECT rate FROM exchange_rates \
             WHERE base_currency = 'USD' AND target_currency = 'EUR'",
        ))
        .await
        .unwrap()
        .unwrap();
    let stored: f64 = row.try_get("", "rate").unwrap();
    assert_eq!(stored, 0.9);
}

#[tokio::test]
async fn lookups_are_directional() {
    let db = migrated_db().await;
    let primary = CountingProvider::new("primary", &[("USD", "EUR", 0.9), ("EUR", "USD", 1.1)]);
    let cache = cache(&db, primary.clone(), None);

    assert_eq!(cache.rate(Currency::USD, Currency::EUR).await.unwrap(), 0.9);
    assert_eq!(cache.rate(Currency::EUR, Currency::USD).await.unwrap(), 1.1);
    assert_eq!(primary.calls(), 2);
}

#[tokio::test]
async fn fallback_provider_is_tried_once_when_primary_fails() {
    let db = migrated_db().await;
    let primary = CountingProvider::down("primary");
    let fallback = CountingProvider::new("fallback", &[("USD", "EUR", 0.91)]);
    let cache = cache(&db, primary.clone(), Some(fallback.clone()));

    assert_eq!(cache.rate(Currency::USD, Currency::EUR).await.unwrap(), 0.91);
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);

    // The fallback result is cached like any other.
    assert_eq!(cache.rate(Currency::USD, Currency::EUR).await.unwrap(), 0.91);
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn stale_rate_is_used_when_every_provider_fails() {
    let db = migrated_db().await;
    store_rate(&db, "USD", "EUR", 0.85, 48).await;
    let primary = CountingProvider::down("primary");
    let fallback = CountingProvider::down("fallback");
    let cache = cache(&db, primary.clone(), Some(fallback.clone()));

    assert_eq!(cache.rate(Currency::USD, Currency::EUR).await.unwrap(), 0.85);
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test]
async fn stale_rate_is_refreshed_when_a_provider_answers() {
    let db = migrated_db().await;
    store_rate(&db, "USD", "EUR", 0.85, 48).await;
    let primary = CountingProvider::new("primary", &[("USD", "EUR", 0.92)]);
    let cache = cache(&db, primary.clone(), None);

    assert_eq!(cache.rate(Currency::USD, Currency::EUR).await.unwrap(), 0.92);
    cache.clear_memory();
    assert_eq!(cache.rate(Currency::USD, Currency::EUR).await.unwrap(), 0.92);
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn unknown_pair_is_unavailable_and_never_fabricated() {
    let db = migrated_db().await;
    let primary = CountingProvider::new("primary", &[("USD", "EUR", 0.9)]);
    let fallback = CountingProvider::new("fallback", &[]);
    let batcher = ConversionBatcher::new(Arc::new(cache(&db, primary, Some(fallback))));

    let err = batcher.convert(100, jpy(), Currency::EUR).await.unwrap_err();
    assert!(matches!(
        err,
        RateError::Unavailable { from, to, .. } if from == jpy() && to == Currency::EUR
    ));

    let err = batcher
        .convert_all(&[ConversionRequest::new(100, jpy(), Currency::EUR)])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExternalProvider(_)));
}

#[tokio::test]
async fn batch_keeps_order_and_looks_each_pair_up_once() {
    let db = migrated_db().await;
    let primary = CountingProvider::new("primary", &[("USD", "EUR", 0.9), ("GBP", "EUR", 1.17)]);
    let batcher = ConversionBatcher::new(Arc::new(cache(&db, primary.clone(), None)));

    let requests = vec![
        ConversionRequest::new(100, Currency::USD, Currency::EUR),
        ConversionRequest::new(5, Currency::EUR, Currency::EUR),
        ConversionRequest::new(200, gbp(), Currency::EUR),
        ConversionRequest::new(300, Currency::USD, Currency::EUR),
        ConversionRequest::new(1, jpy(), Currency::EUR),
    ];
    let results = batcher.convert_batch(&requests).await;
    assert_eq!(results.len(), requests.len());
    assert_eq!(primary.calls(), 3);

    for (request, result) in requests.iter().zip(&results) {
        if request.from == jpy() {
            assert!(result.is_err());
            continue;
        }
        let converted = result.as_ref().unwrap();
        assert_eq!(converted.amount_minor, request.amount_minor);
        assert_eq!(converted.from, request.from);
        let single = batcher
            .convert(request.amount_minor, request.from, request.to)
            .await
            .unwrap();
        assert_eq!(*converted, single);
    }

    let converted: Vec<i64> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|c| c.converted_minor)
        .collect();
    assert_eq!(converted, vec![90, 5, 234, 270]);
}

#[tokio::test]
async fn warm_reports_each_pair_and_fills_the_cache() {
    let db = migrated_db().await;
    let primary = CountingProvider::new("primary", &[("USD", "EUR", 0.9)]);
    let batcher = ConversionBatcher::new(Arc::new(cache(&db, primary.clone(), None)));

    let warmed = batcher
        .warm(&[(Currency::USD, Currency::EUR), (jpy(), Currency::EUR)])
        .await;
    assert_eq!(warmed.len(), 2);
    assert_eq!(warmed[&(Currency::USD, Currency::EUR)], Ok(0.9));
    assert!(warmed[&(jpy(), Currency::EUR)].is_err());

    let calls_after_warm = primary.calls();
    batcher.convert(1000, Currency::USD, Currency::EUR).await.unwrap();
    assert_eq!(primary.calls(), calls_after_warm);
}
