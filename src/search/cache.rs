//! Short-lived single-flight memoization of search results.
//!
//! Each key maps to a slot holding a `OnceCell`. The first caller runs the
//! computation; concurrent callers for the same key wait on the same cell.
//! Failed computations leave the cell empty; a waiting caller retries on the
//! same cell, and the slot is dropped once nobody holds it. The TTL counts from completion; in-flight slots never
//! expire.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::CacheConfig;
use crate::errors::PlanError;
use crate::search::query::CacheKey;

/// Source of monotonic time for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.origin + offset
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

struct Slot<V> {
    inserted_at: Instant,
    cell: OnceCell<(V, Instant)>,
}

impl<V> Slot<V> {
    fn new(now: Instant) -> Self {
        Self {
            inserted_at: now,
            cell: OnceCell::new(),
        }
    }

    fn completed_at(&self) -> Option<Instant> {
        self.cell.get().map(|(_, at)| *at)
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        match self.completed_at() {
            Some(at) => now.saturating_duration_since(at) >= ttl,
            None => false,
        }
    }
}

pub struct SearchCache<V> {
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<CacheKey, Arc<Slot<V>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V> SearchCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: config.ttl(),
            max_entries: config.max_entries.max(1),
            clock,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<Slot<V>>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the cached value for `key`, or runs `compute` once for all
    /// concurrent callers of the same key.
    pub async fn get_or_compute<F, Fut>(&self, key: &CacheKey, compute: F) -> Result<V, PlanError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, PlanError>>,
    {
        let slot = self.slot_for(key);

        if let Some((value, _)) = slot.cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(meal_type = %key.query().meal_type, "search cache hit");
            return Ok(value.clone());
        }

        let clock = Arc::clone(&self.clock);
        let outcome = slot
            .cell
            .get_or_try_init(|| async {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(meal_type = %key.query().meal_type, "search cache miss");
                let value = compute().await?;
                Ok::<_, PlanError>((value, clock.now()))
            })
            .await;

        match outcome {
            Ok((value, _)) => Ok(value.clone()),
            Err(err) => {
                self.discard(key, &slot);
                Err(err)
            }
        }
    }

    /// Live slot for `key`, replacing an expired one. Sweeps on insert.
    fn slot_for(&self, key: &CacheKey) -> Arc<Slot<V>> {
        let now = self.clock.now();
        let mut slots = self.lock();
        if let Some(existing) = slots.get(key) {
            if !existing.is_expired(now, self.ttl) {
                return Arc::clone(existing);
            }
            slots.remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        let slot = Arc::new(Slot::new(now));
        slots.insert(key.clone(), Arc::clone(&slot));
        if slots.len() > self.max_entries {
            self.sweep(&mut slots, now);
        }
        slot
    }

    /// Drops a failed slot unless another caller still holds it. A waiter on
    /// the same cell takes over the computation, and later callers must join
    /// that attempt instead of starting their own.
    fn discard(&self, key: &CacheKey, slot: &Arc<Slot<V>>) {
        let mut slots = self.lock();
        if let Some(current) = slots.get(key) {
            // One reference is the map's, one is ours.
            let unshared = Arc::strong_count(current) == 2;
            if Arc::ptr_eq(current, slot) && current.cell.get().is_none() && unshared {
                slots.remove(key);
            }
        }
    }

    fn sweep(&self, slots: &mut HashMap<CacheKey, Arc<Slot<V>>>, now: Instant) {
        let before = slots.len();
        slots.retain(|_, slot| !slot.is_expired(now, self.ttl));

        if slots.len() > self.max_entries {
            let mut completed: Vec<(CacheKey, Instant)> = slots
                .iter()
                .filter(|(_, slot)| slot.completed_at().is_some())
                .map(|(key, slot)| (key.clone(), slot.inserted_at))
                .collect();
            completed.sort_by_key(|(_, inserted_at)| *inserted_at);
            let overflow = slots.len() - self.max_entries;
            for (key, _) in completed.into_iter().take(overflow) {
                slots.remove(&key);
            }
        }

        let evicted = before - slots.len();
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(evicted, remaining = slots.len(), "swept search cache");
        }
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|_, slot| !slot.is_expired(now, self.ttl));
        let evicted = before - slots.len();
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::MealType;
    use crate::search::query::SearchQuery;
    use std::sync::atomic::AtomicUsize;

    fn cache(ttl_secs: u64, max_entries: usize, clock: Arc<ManualClock>) -> SearchCache<u32> {
        SearchCache::new(&CacheConfig { ttl_secs, max_entries }, clock)
    }

    fn key(meal: MealType) -> CacheKey {
        SearchQuery::new(meal).cache_key()
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_computation() {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(cache(300, 16, clock));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(&key(MealType::Lunch), || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(42)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache(300, 16, Arc::clone(&clock));
        let k = key(MealType::Dinner);

        assert_eq!(cache.get_or_compute(&k, || async { Ok(1) }).await.unwrap(), 1);
        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get_or_compute(&k, || async { Ok(2) }).await.unwrap(), 1);
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get_or_compute(&k, || async { Ok(3) }).await.unwrap(), 3);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache(300, 16, clock);
        let k = key(MealType::Breakfast);

        let err = cache
            .get_or_compute(&k, || async { Err(PlanError::IndexUnavailable("down".into())) })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty());

        assert_eq!(cache.get_or_compute(&k, || async { Ok(7) }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn retry_after_failure_stays_single_flight() {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(cache(300, 16, clock));
        let calls = Arc::new(AtomicUsize::new(0));

        let run = |delay_ms: u64, work_ms: u64, fail: bool| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                cache
                    .get_or_compute(&key(MealType::Lunch), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(work_ms)).await;
                        if fail {
                            Err(PlanError::IndexUnavailable("reset".into()))
                        } else {
                            Ok(5)
                        }
                    })
                    .await
            })
        };

        // First caller fails at 50ms; the second waits and retries until 150ms;
        // the third arrives mid-retry and must join it.
        let first = run(0, 50, true);
        let second = run(10, 100, false);
        let third = run(110, 100, false);

        assert!(first.await.unwrap().is_err());
        assert_eq!(second.await.unwrap().unwrap(), 5);
        assert_eq!(third.await.unwrap().unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cap_evicts_oldest_completed_entries() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache(300, 2, Arc::clone(&clock));

        for (i, meal) in [MealType::Breakfast, MealType::Lunch, MealType::Dinner]
            .into_iter()
            .enumerate()
        {
            cache.get_or_compute(&key(meal), || async move { Ok(i as u32) }).await.unwrap();
            clock.advance(Duration::from_secs(1));
        }
        assert_eq!(cache.len(), 2);
        // Breakfast was oldest and is recomputed.
        let value = cache
            .get_or_compute(&key(MealType::Breakfast), || async { Ok(99) })
            .await
            .unwrap();
        assert_eq!(value, 99);
    }
}
