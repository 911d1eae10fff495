use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::currency::{BASE_CURRENCY, Currency, RateTable};
use crate::rate_provider::RateProvider;

/// Rate source backed by the open.er-api.com latest-rates endpoint.
///
/// The endpoint returns the full multiplier table for the base currency;
/// only the supported currencies are kept.
pub struct OpenErApiProvider {
    base_url: String,
}

impl OpenErApiProvider {
    pub fn new(base_url: &str) -> Self {
        OpenErApiProvider {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct LatestRatesResponse {
    rates: HashMap<String, f64>,
}

impl LatestRatesResponse {
    fn rate(&self, currency: Currency) -> Result<f64> {
        self.rates
            .get(currency.code())
            .copied()
            .ok_or_else(|| anyhow!("No rate found for currency: {}", currency))
    }
}

#[async_trait]
impl RateProvider for OpenErApiProvider {
    #[instrument(name = "RateFetch", skip(self))]
    async fn fetch_rates(&self) -> Result<RateTable> {
        let url = format!("{}/v6/latest/{}", self.base_url, BASE_CURRENCY);
        debug!("Requesting rate table from {}", url);

        let client = reqwest::Client::builder()
            .user_agent("tenge-rates/0.1")
            .build()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for URL: {}", e, url))?;

        if !response.status().is_success() {
            return Err(anyhow!("Currency API error: {}", response.status()));
        }

        let text = response.text().await?;
        let data: LatestRatesResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse rate response: {}", e))?;

        Ok(RateTable {
            usd: data.rate(Currency::Usd)?,
            eur: data.rate(Currency::Eur)?,
            rub: data.rate(Currency::Rub)?,
            // The base currency always maps to itself.
            kzt: 1.0,
        })
    }
}
