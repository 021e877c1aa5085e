//! HTTP rate providers.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, de::DeserializeOwned};

use crate::Currency;

use super::{ProviderError, RateProvider};

fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ProviderError::Http(err.to_string()))
}

async fn get_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
) -> Result<T, ProviderError> {
    let res = http
        .get(url)
        .send()
        .await
        .map_err(|err| ProviderError::Http(err.to_string()))?;

    let status = res.status();
    if !status.is_success() {
        return Err(ProviderError::Http(format!("{url} answered {status}")));
    }
    res.json::<T>()
        .await
        .map_err(|err| ProviderError::InvalidResponse(err.to_string()))
}

fn expand(template: &str, base: Currency) -> String {
    template.replace("{base}", base.code())
}

/// open.er-api.com, broad coverage (160+ currencies).
#[derive(Debug, Clone)]
pub struct OpenErApiProvider {
    http: reqwest::Client,
    url_template: String,
}

#[derive(Debug, Deserialize)]
struct OpenErApiResponse {
    result: String,
    #[serde(default)]
    rates: HashMap<String, f64>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
}

impl OpenErApiProvider {
    pub const DEFAULT_URL: &'static str = "https://open.er-api.com/v6/latest/{base}";

    /// `url_template` must contain a `{base}` placeholder.
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client(timeout)?,
            url_template: url_template.into(),
        })
    }
}

#[async_trait]
impl RateProvider for OpenErApiProvider {
    fn name(&self) -> &str {
        "open.er-api"
    }

    async fn latest(&self, base: Currency) -> Result<HashMap<String, f64>, ProviderError> {
        let url = expand(&self.url_template, base);
        let body: OpenErApiResponse = get_json(&self.http, &url).await?;
        if body.result != "success" {
            return Err(ProviderError::InvalidResponse(
                body.error_type.unwrap_or(body.result),
            ));
        }
        Ok(body.rates)
    }
}

/// api.frankfurter.app, ECB reference rates (about 30 currencies).
#[derive(Debug, Clone)]
pub struct FrankfurterProvider {
    http: reqwest::Client,
    url_template: String,
}

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    rates: HashMap<String, f64>,
}

impl FrankfurterProvider {
    pub const DEFAULT_URL: &'static str = "https://api.frankfurter.app/latest?from={base}";

    /// `url_template` must contain a `{base}` placeholder.
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client(timeout)?,
            url_template: url_template.into(),
        })
    }
}

#[async_trait]
impl RateProvider for FrankfurterProvider {
    fn name(&self) -> &str {
        "frankfurter"
    }

    async fn latest(&self, base: Currency) -> Result<HashMap<String, f64>, ProviderError> {
        let url = expand(&self.url_template, base);
        let body: FrankfurterResponse = get_json(&self.http, &url).await?;
        Ok(body.rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_expand_base() {
        assert_eq!(
            expand(OpenErApiProvider::DEFAULT_URL, Currency::USD),
            "https://open.er-api.com/v6/latest/USD"
        );
        assert_eq!(
            expand(FrankfurterProvider::DEFAULT_URL, Currency::EUR),
            "https://api.frankfurter.app/latest?from=EUR"
        );
    }

    #[test]
    fn open_er_api_body_parses() {
        let body: OpenErApiResponse = serde_json::from_str(
            r#"{"result":"success","base_code":"USD","rates":{"USD":1,"IDR":16250.5}}"#,
        )
        .unwrap();
        assert_eq!(body.result, "success");
        assert_eq!(body.rates.get("IDR"), Some(&16250.5));
    }

    #[test]
    fn frankfurter_body_parses() {
        let body: FrankfurterResponse = serde_json::from_str(
            r#"{"amount":1.0,"base":"EUR","date":"2026-01-05","rates":{"USD":1.0412}}"#,
        )
        .unwrap();
        assert_eq!(body.rates.get("USD"), Some(&1.0412));
    }
}
