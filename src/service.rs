//! Single-slot rate cache with TTL refresh and a graceful-degradation ladder.
//!
//! The service owns at most one [`RateSnapshot`] at a time. A snapshot is
//! fresh while `now - fetched_at < ttl`; once stale the next request triggers
//! an upstream fetch. Fetch failures never escape [`RateService::get_rates`]:
//! a stale snapshot is served as-is, and with no snapshot at all a static
//! fallback table is synthesized per call (never stored). Conversions reuse
//! stale data but refuse the static fallback; with no real data ever observed
//! they fail.
//!
//! The slot lock is not held across the upstream await, so concurrent expiry
//! may trigger duplicate fetches. That is accepted: the overwrite is
//! idempotent and last-write-wins.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::currency::{Currency, RateTable};
use crate::rate_provider::RateProvider;

/// One fetched set of multipliers plus its acquisition time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSnapshot {
    pub rates: RateTable,
    pub fetched_at: DateTime<Utc>,
}

/// Freshness of the cache slot at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Fresh,
    Stale,
}

impl CacheState {
    pub fn of(snapshot: Option<&RateSnapshot>, now: DateTime<Utc>, ttl: Duration) -> Self {
        match snapshot {
            None => CacheState::Empty,
            Some(snap) if now - snap.fetched_at < ttl => CacheState::Fresh,
            Some(_) => CacheState::Stale,
        }
    }
}

/// Diagnostic attached to a degraded [`RatesView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeNote {
    StaleCache,
    FallbackRates,
}

impl ServeNote {
    pub fn message(&self) -> &'static str {
        match self {
            ServeNote::StaleCache => "Using cached data due to API error",
            ServeNote::FallbackRates => "Using fallback rates",
        }
    }
}

/// Outcome of [`RateService::get_rates`]. Always usable, never an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatesView {
    pub rates: RateTable,
    pub cached: bool,
    pub last_update: DateTime<Utc>,
    pub note: Option<ServeNote>,
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub amount: f64,
    pub converted: f64,
    pub currency: Currency,
    /// The exact multiplier taken from the snapshot active at computation.
    pub rate: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// No snapshot exists and the upstream could not be reached. Conversions
    /// do not fabricate values from the static fallback table.
    #[error("no rate table available")]
    RatesUnavailable,
}

pub struct RateService {
    provider: Box<dyn RateProvider>,
    ttl: Duration,
    slot: Mutex<Option<RateSnapshot>>,
}

impl RateService {
    pub fn new(provider: Box<dyn RateProvider>, ttl: Duration) -> Self {
        RateService {
            provider,
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Serve the rate table, refreshing on expiry and degrading on failure.
    ///
    /// `now` is injected so tests can drive TTL transitions directly.
    pub async fn get_rates(&self, now: DateTime<Utc>) -> RatesView {
        let existing = *self.slot.lock().await;
        if let Some(snap) = existing {
            if CacheState::of(Some(&snap), now, self.ttl) == CacheState::Fresh {
                debug!("Serving fresh cached rates");
                return RatesView {
                    rates: snap.rates,
                    cached: true,
                    last_update: snap.fetched_at,
                    note: None,
                };
            }
        }

        match self.provider.fetch_rates().await {
            Ok(rates) => {
                let snap = RateSnapshot {
                    rates,
                    fetched_at: now,
                };
                *self.slot.lock().await = Some(snap);
                debug!("Stored refreshed rate snapshot");
                RatesView {
                    rates,
                    cached: false,
                    last_update: now,
                    note: None,
                }
            }
            Err(err) => {
                warn!(error = %err, "Rate fetch failed");
                match existing {
                    // Stale data beats no data. The slot is left untouched.
                    Some(snap) => RatesView {
                        rates: snap.rates,
                        cached: true,
                        last_update: snap.fetched_at,
                        note: Some(ServeNote::StaleCache),
                    },
                    None => RatesView {
                        rates: RateTable::FALLBACK,
                        cached: false,
                        last_update: now,
                        note: Some(ServeNote::FallbackRates),
                    },
                }
            }
        }
    }

    /// Convert `amount` from the base currency into `to`, rounded to two
    /// decimal places.
    ///
    /// A stale or empty slot triggers one refresh attempt first; on failure
    /// the stale snapshot is reused, but an empty slot means there is nothing
    /// honest to compute with and the conversion fails.
    pub async fn convert(
        &self,
        amount: f64,
        to: Currency,
        now: DateTime<Utc>,
    ) -> Result<Conversion, ConvertError> {
        let existing = *self.slot.lock().await;
        let table = match CacheState::of(existing.as_ref(), now, self.ttl) {
            CacheState::Fresh => existing.map(|snap| snap.rates),
            CacheState::Empty | CacheState::Stale => match self.provider.fetch_rates().await {
                Ok(rates) => {
                    *self.slot.lock().await = Some(RateSnapshot {
                        rates,
                        fetched_at: now,
                    });
                    Some(rates)
                }
                Err(err) => {
                    warn!(error = %err, "Rate fetch failed during conversion");
                    existing.map(|snap| snap.rates)
                }
            },
        };

        let table = table.ok_or(ConvertError::RatesUnavailable)?;
        let rate = table.get(to);
        Ok(Conversion {
            amount,
            converted: round2(amount * rate),
            currency: to,
            rate,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ttl() -> Duration {
        Duration::hours(1)
    }

    fn table(usd: f64) -> RateTable {
        RateTable {
            usd,
            eur: 0.0019,
            rub: 0.2,
            kzt: 1.0,
        }
    }

    /// Replays a queue of fetch outcomes and counts upstream calls.
    struct ScriptedProvider {
        outcomes: std::sync::Mutex<VecDeque<Result<RateTable, String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(outcomes: Vec<Result<RateTable, String>>) -> Self {
            ScriptedProvider {
                outcomes: std::sync::Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RateProvider for &'static ScriptedProvider {
        async fn fetch_rates(&self) -> anyhow::Result<RateTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected upstream call");
            outcome.map_err(|e| anyhow!(e))
        }
    }

    fn scripted(outcomes: Vec<Result<RateTable, String>>) -> (&'static ScriptedProvider, RateService) {
        let provider: &'static ScriptedProvider = Box::leak(Box::new(ScriptedProvider::new(outcomes)));
        (provider, RateService::new(Box::new(provider), ttl()))
    }

    fn t0() -> DateTime<Utc> {
        "2026-01-15T09:00:00Z".parse().unwrap()
    }

    #[tokio::test]
    async fn test_fresh_snapshot_served_without_fetch() {
        let (provider, service) = scripted(vec![Ok(table(0.002))]);

        let first = service.get_rates(t0()).await;
        assert!(!first.cached);
        assert_eq!(first.rates, table(0.002));

        let second = service.get_rates(t0() + Duration::minutes(30)).await;
        assert!(second.cached);
        assert_eq!(second.rates, table(0.002));
        assert_eq!(second.last_update, t0());
        assert!(second.note.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_snapshot_is_refreshed_and_stored() {
        let (provider, service) = scripted(vec![Ok(table(0.002)), Ok(table(0.0025))]);

        service.get_rates(t0()).await;
        let later = t0() + Duration::hours(2);
        let refreshed = service.get_rates(later).await;
        assert!(!refreshed.cached);
        assert_eq!(refreshed.rates, table(0.0025));
        assert_eq!(refreshed.last_update, later);

        // The refreshed snapshot is now the cached value.
        let cached = service.get_rates(later + Duration::minutes(5)).await;
        assert!(cached.cached);
        assert_eq!(cached.rates, table(0.0025));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_snapshot_at_exact_ttl_is_stale() {
        let (provider, service) = scripted(vec![Ok(table(0.002)), Ok(table(0.0025))]);

        service.get_rates(t0()).await;
        let view = service.get_rates(t0() + ttl()).await;
        assert!(!view.cached);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_serves_stale_snapshot_unchanged() {
        let (provider, service) = scripted(vec![
            Ok(table(0.002)),
            Err("boom".to_string()),
            Ok(table(0.003)),
        ]);

        service.get_rates(t0()).await;
        let degraded = service.get_rates(t0() + Duration::hours(2)).await;
        assert!(degraded.cached);
        assert_eq!(degraded.rates, table(0.002));
        assert_eq!(degraded.last_update, t0());
        assert_eq!(degraded.note, Some(ServeNote::StaleCache));

        // The failed refresh did not touch the slot: the next attempt still
        // sees the stale snapshot and fetches again.
        let recovered = service.get_rates(t0() + Duration::hours(3)).await;
        assert!(!recovered.cached);
        assert_eq!(recovered.rates, table(0.003));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_with_empty_cache_serves_fallback() {
        let (provider, service) = scripted(vec![Err("down".to_string()), Ok(table(0.002))]);

        let fallback = service.get_rates(t0()).await;
        assert!(!fallback.cached);
        assert_eq!(fallback.rates, RateTable::FALLBACK);
        assert_eq!(fallback.note, Some(ServeNote::FallbackRates));

        // The fallback table was not stored, so the next call fetches real
        // data instead of serving constants.
        let real = service.get_rates(t0() + Duration::minutes(1)).await;
        assert!(!real.cached);
        assert_eq!(real.rates, table(0.002));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_convert_rounds_to_two_decimals() {
        let (provider, service) = scripted(vec![Ok(table(0.002))]);

        let conversion = service.convert(100.0, Currency::Usd, t0()).await.unwrap();
        assert_eq!(conversion.converted, 0.2);
        assert_eq!(conversion.rate, 0.002);
        assert_eq!(conversion.amount, 100.0);
        assert_eq!(conversion.currency, Currency::Usd);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_convert_uses_fresh_snapshot_without_fetch() {
        let (provider, service) = scripted(vec![Ok(table(0.002))]);

        service.get_rates(t0()).await;
        let conversion = service
            .convert(500_000.0, Currency::Usd, t0() + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(conversion.converted, 1000.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_convert_refreshes_expired_snapshot() {
        let (provider, service) = scripted(vec![Ok(table(0.002)), Ok(table(0.004))]);

        service.get_rates(t0()).await;
        let later = t0() + Duration::hours(2);
        let conversion = service.convert(100.0, Currency::Usd, later).await.unwrap();
        assert_eq!(conversion.rate, 0.004);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        // The refresh performed by convert is visible to get_rates.
        let view = service.get_rates(later + Duration::minutes(1)).await;
        assert!(view.cached);
        assert_eq!(view.rates, table(0.004));
    }

    #[tokio::test]
    async fn test_convert_reuses_stale_snapshot_on_fetch_failure() {
        let (_, service) = scripted(vec![Ok(table(0.002)), Err("down".to_string())]);

        service.get_rates(t0()).await;
        let conversion = service
            .convert(100.0, Currency::Usd, t0() + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(conversion.rate, 0.002);
    }

    #[tokio::test]
    async fn test_convert_fails_with_no_data_at_all() {
        let (_, service) = scripted(vec![Err("down".to_string())]);

        let result = service.convert(100.0, Currency::Usd, t0()).await;
        assert!(matches!(result, Err(ConvertError::RatesUnavailable)));
    }

    #[tokio::test]
    async fn test_convert_to_base_currency_is_identity() {
        let (_, service) = scripted(vec![Ok(table(0.002))]);

        let conversion = service.convert(123.456, Currency::Kzt, t0()).await.unwrap();
        assert_eq!(conversion.rate, 1.0);
        assert_eq!(conversion.converted, 123.46);
    }

    #[test]
    fn test_cache_state_transitions() {
        let snap = RateSnapshot {
            rates: table(0.002),
            fetched_at: t0(),
        };
        assert_eq!(CacheState::of(None, t0(), ttl()), CacheState::Empty);
        assert_eq!(
            CacheState::of(Some(&snap), t0() + Duration::minutes(59), ttl()),
            CacheState::Fresh
        );
        assert_eq!(CacheState::of(Some(&snap), t0() + ttl(), ttl()), CacheState::Stale);
    }
}
