// src/geocode.rs
// Narrow geocoding collaborator interface and the degraded-mode wrapper
// the recommendation flow actually talks to.

use std::future::Future;
use std::num::NonZeroUsize;
use std::time::Duration;

use log::warn;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::errors::EngineError;
use crate::models::GeoPoint;

/// Coordinates substituted when the collaborator cannot resolve a
/// location: the country centroid.
pub const COUNTRY_CENTROID: GeoPoint = GeoPoint { lat: 4.5709, lng: -74.2973 };

/// Address string substituted when reverse geocoding fails.
pub const UNKNOWN_ADDRESS: &str = "direccion desconocida";

const GEOCODE_CACHE_SIZE: usize = 512;

/// External geocoding collaborator. Both operations may fail or time out;
/// callers treat failure as "unknown", never as fatal.
pub trait Geocoder: Send + Sync {
    fn geocode(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<GeoPoint>, EngineError>> + Send;

    fn reverse_geocode(
        &self,
        lat: f64,
        lng: f64,
    ) -> impl Future<Output = Result<String, EngineError>> + Send;
}

/// Wraps a collaborator with bounded retries, a result cache and the
/// degraded-mode substitutions, so a geocoding outage can never abort a
/// recommendation.
pub struct ResilientGeocoder<G> {
    inner: G,
    attempts: usize,
    retry_delay: Duration,
    cache: Mutex<LruCache<String, GeoPoint>>,
}

impl<G: Geocoder> ResilientGeocoder<G> {
    pub fn new(inner: G) -> Self {
        Self::with_policy(inner, 3, Duration::from_secs(1))
    }

    pub fn with_policy(inner: G, attempts: usize, retry_delay: Duration) -> Self {
        ResilientGeocoder {
            inner,
            attempts: attempts.max(1),
            retry_delay,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(GEOCODE_CACHE_SIZE).expect("cache size is non-zero"),
            )),
        }
    }

    /// Resolve an address, retrying transient failures. Exhausted retries
    /// and unknown addresses both degrade to [`COUNTRY_CENTROID`].
    pub async fn locate_or_centroid(&self, address: &str) -> GeoPoint {
        if let Some(hit) = self.cache.lock().await.get(address) {
            return *hit;
        }

        for attempt in 1..=self.attempts {
            match self.inner.geocode(address).await {
                Ok(Some(point)) => {
                    self.cache.lock().await.put(address.to_string(), point);
                    return point;
                }
                Ok(None) => {
                    warn!("geocoder found no result for '{}', using country centroid", address);
                    return COUNTRY_CENTROID;
                }
                Err(e) => {
                    warn!(
                        "geocoding '{}' failed (attempt {}/{}): {}",
                        address, attempt, self.attempts, e
                    );
                    if attempt < self.attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        warn!("geocoder exhausted retries for '{}', using country centroid", address);
        COUNTRY_CENTROID
    }

    /// Reverse-geocode, degrading to [`UNKNOWN_ADDRESS`] on any failure.
    pub async fn describe_or_unknown(&self, lat: f64, lng: f64) -> String {
        match self.inner.reverse_geocode(lat, lng).await {
            Ok(address) if !address.trim().is_empty() => address,
            Ok(_) => UNKNOWN_ADDRESS.to_string(),
            Err(e) => {
                warn!("reverse geocoding ({}, {}) failed: {}", lat, lng, e);
                UNKNOWN_ADDRESS.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Collaborator that fails a fixed number of times before answering.
    struct FlakyGeocoder {
        failures_before_success: usize,
        calls: AtomicUsize,
        answer: Option<GeoPoint>,
    }

    impl Geocoder for FlakyGeocoder {
        async fn geocode(&self, _address: &str) -> Result<Option<GeoPoint>, EngineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures_before_success {
                Err(EngineError::source_unavailable("nominatim", "timed out", true))
            } else {
                Ok(self.answer)
            }
        }

        async fn reverse_geocode(&self, _lat: f64, _lng: f64) -> Result<String, EngineError> {
            Err(EngineError::source_unavailable("nominatim", "timed out", true))
        }
    }

    fn flaky(failures: usize, answer: Option<GeoPoint>) -> ResilientGeocoder<FlakyGeocoder> {
        ResilientGeocoder::with_policy(
            FlakyGeocoder { failures_before_success: failures, calls: AtomicUsize::new(0), answer },
            3,
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_retries_then_succeeds_and_caches() {
        let geocoder = flaky(2, Some(GeoPoint::new(6.25, -75.57)));
        let point = geocoder.locate_or_centroid("Medellín").await;
        assert_eq!(point, GeoPoint::new(6.25, -75.57));
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 3);

        // Second lookup is served from the cache, not the collaborator.
        let again = geocoder.locate_or_centroid("Medellín").await;
        assert_eq!(again, point);
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_degrade_to_centroid() {
        let geocoder = flaky(10, Some(GeoPoint::new(6.25, -75.57)));
        assert_eq!(geocoder.locate_or_centroid("Medellín").await, COUNTRY_CENTROID);
    }

    #[tokio::test]
    async fn test_unknown_address_degrades_to_centroid_without_retry() {
        let geocoder = flaky(0, None);
        assert_eq!(geocoder.locate_or_centroid("Ciudad Inexistente").await, COUNTRY_CENTROID);
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reverse_geocode_failure_is_unknown_not_error() {
        let geocoder = flaky(0, None);
        assert_eq!(geocoder.describe_or_unknown(6.25, -75.57).await, UNKNOWN_ADDRESS);
    }
}
