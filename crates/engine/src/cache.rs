//! Time-bounded memo of chart comparisons.
//!
//! Entries are keyed by the natal chart's `calculated_at` string and live for
//! a fixed TTL measured from the moment they were stored.  Expiry is checked
//! when an entry is read; expired entries are swept from the whole map only
//! after a write.  There is no size bound and no background timer.
//!
//! Each key owns a slot with its own async lock, held across the compute.
//! Concurrent callers for one key share a single collaborator call, while
//! callers for other keys only contend on the brief slot-map lookup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use alchm_config::EngineConfig;

use crate::chart::{
    ChartComparator, ChartComparison, MomentChart, MomentChartSource, NatalChart,
};

/// Five minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CachedComparison {
    comparison: ChartComparison,
    cached_at: Instant,
}

impl CachedComparison {
    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.cached_at) < ttl
    }
}

/// `None` while the first compute for the key is in flight.
type Slot = Arc<Mutex<Option<CachedComparison>>>;

#[derive(Debug)]
pub struct ChartComparisonCache {
    ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Default for ChartComparisonCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ChartComparisonCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.cache_ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        slots.entry(key.to_string()).or_default().clone()
    }

    /// Return the live entry for `key`, or run `compute`, store its result
    /// and sweep every expired entry.
    ///
    /// A failed compute is returned as-is and leaves the cache untouched.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<ChartComparison>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ChartComparison>>,
    {
        let slot = self.slot(key).await;
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.is_live(Instant::now(), self.ttl) {
                debug!(key, "chart comparison cache hit");
                return Ok(cached.comparison.clone());
            }
        }

        debug!(key, "chart comparison cache miss");
        let comparison = match compute().await {
            Ok(comparison) => comparison,
            Err(err) => {
                warn!(key, error = %err, "chart comparison failed");
                let keep = entry.is_some();
                drop(entry);
                if !keep {
                    self.release_empty_slot(key, &slot).await;
                }
                return Err(err);
            }
        };

        let cached_at = Instant::now();
        *entry = Some(CachedComparison {
            comparison: comparison.clone(),
            cached_at,
        });
        drop(entry);

        self.sweep(key, &slot, cached_at).await;
        Ok(comparison)
    }

    /// [`Self::get_or_compute`] keyed by `natal.calculated_at`.  On a miss the
    /// moment chart is `moment`, or else fetched from `moments`, and
    /// `comparator` is called with it.
    pub async fn get_or_compare(
        &self,
        natal: &NatalChart,
        moment: Option<&MomentChart>,
        moments: &dyn MomentChartSource,
        comparator: &dyn ChartComparator,
    ) -> Result<ChartComparison> {
        self.get_or_compute(&natal.calculated_at, move || async move {
            let fetched;
            let moment = match moment {
                Some(moment) => moment,
                None => {
                    fetched = moments
                        .current_moment_chart()
                        .await
                        .context("resolving current moment chart")?;
                    &fetched
                }
            };
            comparator.compare(natal, Some(moment)).await.with_context(|| {
                format!("chart comparison failed for natal chart {}", natal.calculated_at)
            })
        })
        .await
    }

    // Drop a slot whose first compute failed, unless another caller has
    // since filled it or replaced it.
    async fn release_empty_slot(&self, key: &str, slot: &Slot) {
        let mut slots = self.slots.lock().await;
        let Some(current) = slots.get(key) else {
            return;
        };
        if !Arc::ptr_eq(current, slot) {
            return;
        }
        let idle = current.try_lock().is_ok_and(|guard| guard.is_none());
        if idle {
            slots.remove(key);
        }
    }

    // Slots that are locked or still empty belong to in-flight computes and
    // are kept.
    async fn sweep(&self, key: &str, slot: &Slot, now: Instant) {
        let ttl = self.ttl;
        let mut slots = self.slots.lock().await;
        // A concurrent clear or failed compute may have detached this slot.
        slots.entry(key.to_string()).or_insert_with(|| slot.clone());

        let before = slots.len();
        slots.retain(|_, entry| match entry.try_lock() {
            Ok(guard) => guard.as_ref().is_none_or(|cached| cached.is_live(now, ttl)),
            Err(_) => true,
        });
        let swept = before - slots.len();
        if swept > 0 {
            debug!(swept, remaining = slots.len(), "swept expired chart comparisons");
        }
    }

    /// Peek at a live entry without computing anything.  An entry whose
    /// compute is in flight reads as absent.
    pub async fn get(&self, key: &str) -> Option<ChartComparison> {
        let slot = self.slots.lock().await.get(key).cloned()?;
        let guard = slot.try_lock().ok()?;
        guard
            .as_ref()
            .filter(|cached| cached.is_live(Instant::now(), self.ttl))
            .map(|cached| cached.comparison.clone())
    }

    /// Number of stored entries, expired ones included until the next sweep.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        let mut slots = self.slots.lock().await;
        let dropped = slots.len();
        slots.clear();
        debug!(dropped, "chart comparison cache cleared");
    }
}
