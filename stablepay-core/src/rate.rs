//! Exchange rate feed.
//!
//! `RateFeed` holds the fiat-per-token rate behind `Arc<RwLock<_>>` with a
//! version counter and a watch channel, so the converter always reads one
//! consistent value and subscribers can react to refreshes without polling.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, watch};
use tracing::info;

/// Fiat units paid per whole stablecoin token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRate {
    pub fiat_per_token: Decimal,
    /// ISO code, uppercase.
    pub fiat_currency: String,
    pub updated_at: time::OffsetDateTime,
}

impl ExchangeRate {
    pub fn new(fiat_per_token: Decimal, fiat_currency: impl Into<String>) -> Self {
        Self {
            fiat_per_token,
            fiat_currency: fiat_currency.into().to_ascii_uppercase(),
            updated_at: time::OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RateError {
    #[error("exchange rate must be positive, got {0}")]
    NonPositive(Decimal),
    #[error("rate currency {got} does not match feed currency {expected}")]
    CurrencyMismatch { expected: String, got: String },
}

/// A shared, versioned exchange rate with change notification.
pub struct RateFeed {
    inner: Arc<RateFeedInner>,
}

struct RateFeedInner {
    data: RwLock<ExchangeRate>,
    version: AtomicU64,
    version_tx: watch::Sender<u64>,
}

/// Receives notifications when a [`RateFeed`] is refreshed.
pub struct RateWatcher {
    version_rx: watch::Receiver<u64>,
}

// -- RateFeed -----------------------------------------------------------

impl RateFeed {
    pub fn new(initial: ExchangeRate) -> Result<Self, RateError> {
        if initial.fiat_per_token <= Decimal::ZERO {
            return Err(RateError::NonPositive(initial.fiat_per_token));
        }
        let (version_tx, _) = watch::channel(0u64);
        Ok(Self {
            inner: Arc::new(RateFeedInner {
                data: RwLock::new(initial),
                version: AtomicU64::new(0),
                version_tx,
            }),
        })
    }

    /// Replace the rate and notify all watchers. The currency cannot change.
    pub async fn update(&self, rate: ExchangeRate) -> Result<u64, RateError> {
        if rate.fiat_per_token <= Decimal::ZERO {
            return Err(RateError::NonPositive(rate.fiat_per_token));
        }
        let mut guard = self.inner.data.write().await;
        if guard.fiat_currency != rate.fiat_currency {
            return Err(RateError::CurrencyMismatch {
                expected: guard.fiat_currency.clone(),
                got: rate.fiat_currency,
            });
        }
        info!(
            currency = %rate.fiat_currency,
            previous = %guard.fiat_per_token,
            current = %rate.fiat_per_token,
            "Exchange rate updated"
        );
        *guard = rate;
        let new_version = self.inner.version.fetch_add(1, Ordering::Relaxed) + 1;
        drop(guard);
        let _ = self.inner.version_tx.send(new_version);
        Ok(new_version)
    }

    /// A copy of the current rate.
    pub async fn current(&self) -> ExchangeRate {
        self.inner.data.read().await.clone()
    }

    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> RateWatcher {
        RateWatcher {
            version_rx: self.inner.version_tx.subscribe(),
        }
    }
}

impl Clone for RateFeed {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// -- RateWatcher --------------------------------------------------------

impl RateWatcher {
    /// Wait until the feed is refreshed. Errors once the feed is dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.version_rx.changed().await
    }
}
