//! Live exchange rate refresher.
//!
//! Pulls the stablecoin price in the order currency from the CoinGecko
//! simple price API and pushes it into the shared [`RateFeed`] on a fixed
//! interval. A failed refresh keeps the previous rate.

use rust_decimal::Decimal;
use serde::Deserialize;
use stablepay_core::rate::RateError;
use stablepay_core::{ExchangeRate, RateFeed};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RateSourceError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("rate limited by the price API")]
    RateLimited,

    #[error("no {currency} price for {coin_id} in response")]
    MissingPrice { coin_id: String, currency: String },

    #[error("rejected rate: {0}")]
    Rate(#[from] RateError),
}

/// `{"tether": {"vnd": 25410.5}}`
type SimplePriceResponse = HashMap<String, HashMap<String, Decimal>>;

/// Price lookups against the CoinGecko API.
pub struct CoinGeckoSource {
    http_client: reqwest::Client,
    api_url: String,
    coin_id: String,
}

impl CoinGeckoSource {
    pub fn new(api_url: impl Into<String>, coin_id: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_url: api_url.into(),
            coin_id: coin_id.into(),
        }
    }

    /// Price of one token in `currency`.
    pub async fn fetch(&self, currency: &str) -> Result<Decimal, RateSourceError> {
        let currency = currency.to_ascii_lowercase();
        let url = format!("{}/simple/price", self.api_url.trim_end_matches('/'));
        let response = self
            .http_client
            .get(&url)
            .query(&[("ids", self.coin_id.as_str()), ("vs_currencies", currency.as_str())])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RateSourceError::RateLimited);
        }

        let prices: SimplePriceResponse = response.error_for_status()?.json().await?;
        prices
            .get(&self.coin_id)
            .and_then(|by_currency| by_currency.get(&currency))
            .copied()
            .ok_or(RateSourceError::MissingPrice {
                coin_id: self.coin_id.clone(),
                currency,
            })
    }

    /// Fetch the current price and store it in `feed`. Returns the new feed
    /// version.
    pub async fn refresh(&self, feed: &RateFeed) -> Result<u64, RateSourceError> {
        let currency = feed.current().await.fiat_currency;
        let price = self.fetch(&currency).await?;
        let version = feed.update(ExchangeRate::new(price, currency)).await?;
        Ok(version)
    }
}

/// Refresh `feed` every `interval` until `shutdown_rx` flips to `true`. The
/// first refresh happens one interval from now.
pub fn spawn_rate_refresher(
    source: CoinGeckoSource,
    feed: RateFeed,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        info!(interval_secs = interval.as_secs(), coin_id = %source.coin_id, "Rate refresher started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Rate refresher received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match source.refresh(&feed).await {
                        Ok(version) => {
                            let rate = feed.current().await;
                            debug!(version, rate = %rate.fiat_per_token, currency = %rate.fiat_currency, "Exchange rate refreshed");
                        }
                        Err(e) => warn!(error = %e, "Failed to refresh exchange rate, keeping previous value"),
                    }
                }
            }
        }
    })
}
