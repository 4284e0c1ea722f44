// src/cache.rs
// Read-mostly TTL caches for the directory and correspondence tables.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::EngineError;

/// Metadata about the currently published cache value.
#[derive(Debug, Clone)]
pub struct CacheInfo {
    pub build_id: Uuid,
    pub built_at: DateTime<Utc>,
    pub signature: Option<String>,
}

struct CacheSlot<T> {
    value: Arc<T>,
    built_at: Instant,
    info: CacheInfo,
}

/// An explicit cache object replacing framework-managed memoization:
/// built lazily on first access, reused within the TTL window, rebuilt
/// wholesale on expiry, signature change or [`TtlCache::invalidate`].
///
/// The single Mutex doubles as the rebuild-in-flight guard, so at most one
/// rebuild runs at a time and a value is only ever published complete;
/// readers never observe a partially built table. A rebuild that outlives
/// the configured timeout fails the request with a retryable error
/// instead of hanging.
pub struct TtlCache<T> {
    name: &'static str,
    ttl: Duration,
    rebuild_timeout: Duration,
    slot: Mutex<Option<CacheSlot<T>>>,
}

impl<T> TtlCache<T> {
    pub fn new(name: &'static str, ttl: Duration, rebuild_timeout: Duration) -> Self {
        TtlCache { name, ttl, rebuild_timeout, slot: Mutex::new(None) }
    }

    /// Return the published value, rebuilding first if it is absent,
    /// older than the TTL, or was built from different source content
    /// (`signature` mismatch).
    pub async fn get_or_build<F, Fut>(
        &self,
        signature: Option<String>,
        build: F,
    ) -> Result<Arc<T>, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(current) = slot.as_ref() {
            let fresh = current.built_at.elapsed() < self.ttl;
            let same_source = match (&signature, &current.info.signature) {
                (Some(new), Some(old)) => new == old,
                _ => true,
            };
            if fresh && same_source {
                return Ok(Arc::clone(&current.value));
            }
            if !same_source {
                info!("cache '{}': source content changed, rebuilding", self.name);
            }
        }

        let build_id = Uuid::new_v4();
        info!("cache '{}': rebuild {} starting", self.name, build_id);
        let started = Instant::now();

        let value = match tokio::time::timeout(self.rebuild_timeout, build()).await {
            Ok(Ok(value)) => Arc::new(value),
            Ok(Err(e)) => {
                warn!("cache '{}': rebuild {} failed: {}", self.name, build_id, e);
                return Err(e);
            }
            Err(_) => {
                warn!(
                    "cache '{}': rebuild {} exceeded timeout of {:?}",
                    self.name, build_id, self.rebuild_timeout
                );
                return Err(EngineError::RebuildTimeout(self.rebuild_timeout));
            }
        };

        info!(
            "cache '{}': rebuild {} published in {:.2?}",
            self.name,
            build_id,
            started.elapsed()
        );
        *slot = Some(CacheSlot {
            value: Arc::clone(&value),
            built_at: Instant::now(),
            info: CacheInfo { build_id, built_at: Utc::now(), signature },
        });
        Ok(value)
    }

    /// Drop the published value; the next access rebuilds.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            info!("cache '{}': invalidated", self.name);
        }
    }

    /// Metadata of the published value, if any.
    pub async fn info(&self) -> Option<CacheInfo> {
        self.slot.lock().await.as_ref().map(|s| s.info.clone())
    }
}
