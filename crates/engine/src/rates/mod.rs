//! Exchange rates and currency conversion.
//!
//! Rates are looked up through [`ExchangeRateCache`], which tries, in order:
//! an in-process map, the `exchange_rates` table, the primary provider and the
//! fallback provider. A stale stored rate is the last resort; a rate is never
//! made up. [`ConversionBatcher`] sits on top and converts many amounts with
//! one lookup per distinct currency pair.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::Currency;

mod batch;
mod cache;
mod providers;

pub use batch::{ConversionBatcher, ConversionRequest, Converted};
pub use cache::{ExchangeRateCache, ExchangeRateCacheBuilder};
pub use providers::{FrankfurterProvider, OpenErApiProvider};

/// Error type for provider operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported currency pair: {0}")]
    UnsupportedPair(String),
}

/// Failure to obtain a rate from every tier.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateError {
    #[error("no exchange rate for {from} -> {to}: {reason}")]
    Unavailable {
        from: Currency,
        to: Currency,
        reason: String,
    },
}

/// A remote source of exchange rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Latest rates from `base` to every currency the provider knows, keyed
    /// by ISO code.
    async fn latest(&self, base: Currency) -> Result<HashMap<String, f64>, ProviderError>;
}

/// Looks up the `from -> to` rate in a provider response.
pub(crate) async fn provider_rate(
    provider: &dyn RateProvider,
    from: Currency,
    to: Currency,
) -> Result<f64, ProviderError> {
    let rates = provider.latest(from).await?;
    match rates.get(to.code()) {
        Some(rate) if rate.is_finite() && *rate > 0.0 => Ok(*rate),
        Some(rate) => Err(ProviderError::InvalidResponse(format!(
            "{} returned rate {rate} for {from}_{to}",
            provider.name()
        ))),
        None => Err(ProviderError::UnsupportedPair(format!("{from}_{to}"))),
    }
}
