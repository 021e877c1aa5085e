use std::{collections::HashMap, sync::Arc};

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::{Currency, Money, ResultEngine};

use super::{ExchangeRateCache, RateError};

/// One amount to convert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub amount_minor: i64,
    pub from: Currency,
    pub to: Currency,
}

impl ConversionRequest {
    #[must_use]
    pub fn new(amount_minor: i64, from: Currency, to: Currency) -> Self {
        Self {
            amount_minor,
            from,
            to,
        }
    }
}

/// Result of a single conversion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Converted {
    pub amount_minor: i64,
    pub from: Currency,
    pub to: Currency,
    pub rate: f64,
    /// `amount_minor * rate` in `to` minor units, rounded half away from zero.
    pub converted_minor: i64,
}

impl Converted {
    fn new(request: &ConversionRequest, rate: f64) -> Self {
        Self {
            amount_minor: request.amount_minor,
            from: request.from,
            to: request.to,
            rate,
            converted_minor: Money::new(request.amount_minor)
                .convert(request.from, request.to, rate)
                .minor(),
        }
    }
}

/// Converts many amounts with a single rate lookup per currency pair.
#[derive(Debug, Clone)]
pub struct ConversionBatcher {
    cache: Arc<ExchangeRateCache>,
}

impl ConversionBatcher {
    pub fn new(cache: Arc<ExchangeRateCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ExchangeRateCache {
        &self.cache
    }

    /// Converts every request; one failed pair only fails its own requests.
    ///
    /// Distinct pairs are looked up concurrently and the output keeps the
    /// order of `requests`.
    pub async fn convert_batch(
        &self,
        requests: &[ConversionRequest],
    ) -> Vec<Result<Converted, RateError>> {
        let mut groups: Vec<((Currency, Currency), Vec<usize>)> = Vec::new();
        let mut results: Vec<(usize, Result<Converted, RateError>)> =
            Vec::with_capacity(requests.len());

        for (index, request) in requests.iter().enumerate() {
            if request.from == request.to {
                results.push((index, Ok(Converted::new(request, 1.0))));
                continue;
            }
            let pair = (request.from, request.to);
            match groups.iter_mut().find(|(p, _)| *p == pair) {
                Some((_, indexes)) => indexes.push(index),
                None => groups.push((pair, vec![index])),
            }
        }

        let lookups = groups.into_iter().map(|((from, to), indexes)| async move {
            let rate = self.cache.rate(from, to).await;
            (indexes, rate)
        });
        for (indexes, rate) in join_all(lookups).await {
            for index in indexes {
                let converted = rate
                    .clone()
                    .map(|rate| Converted::new(&requests[index], rate));
                results.push((index, converted));
            }
        }

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Like [`convert_batch`](Self::convert_batch), failing on the first
    /// unavailable rate.
    pub async fn convert_all(
        &self,
        requests: &[ConversionRequest],
    ) -> ResultEngine<Vec<Converted>> {
        self.convert_batch(requests)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub async fn convert(
        &self,
        amount_minor: i64,
        from: Currency,
        to: Currency,
    ) -> Result<Converted, RateError> {
        let request = ConversionRequest::new(amount_minor, from, to);
        self.convert_batch(std::slice::from_ref(&request))
            .await
            .into_iter()
            .next()
            .unwrap_or(Err(RateError::Unavailable {
                from,
                to,
                reason: "empty batch".to_string(),
            }))
    }

    /// Populates the cache tiers for `pairs` ahead of a batch.
    pub async fn warm(
        &self,
        pairs: &[(Currency, Currency)],
    ) -> HashMap<(Currency, Currency), Result<f64, RateError>> {
        let lookups = pairs
            .iter()
            .map(|&(from, to)| async move { ((from, to), self.cache.rate(from, to).await) });
        join_all(lookups).await.into_iter().collect()
    }
}
