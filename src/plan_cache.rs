//! Query plan caching
//!
//! Compiled plans are cached by operation fingerprint so repeated operations
//! skip the plan compiler. The cache is bounded by an approximate byte budget
//! rather than an entry count: a candidate's size is the byte length of its
//! serialized form, measured once at insert time. When an insertion would
//! exceed the budget, least-recently-used entries are evicted first.
//!
//! Cache writes are detached from the request path: [`QueryPlanCache::spawn_insert`]
//! runs on a background task and failures are logged, never surfaced — the
//! plan already returned to the caller stays valid regardless.
//!
//! `flush()` empties the cache wholesale; it runs exactly once per confirmed
//! schema change, strictly before the new schema is published, so no plan
//! compiled against the old schema survives the swap.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::plan::QueryPlan;

/// Recency bookkeeping; holding this lock is what serializes cache mutation.
#[derive(Default)]
struct LruState {
    /// Fingerprints ordered least- to most-recently used
    order: Vec<String>,
    /// Approximate serialized size per fingerprint
    sizes: HashMap<String, usize>,
    total_bytes: usize,
}

/// Size-bounded LRU cache mapping operation fingerprints to compiled plans.
///
/// Lookups run concurrently against the entry map; eviction and insertion
/// decisions are serialized through the recency lock.
pub struct QueryPlanCache {
    max_bytes: usize,
    entries: RwLock<HashMap<String, Arc<QueryPlan>>>,
    lru: Mutex<LruState>,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanCacheStats {
    pub entries: usize,
    pub approximate_bytes: usize,
    pub max_bytes: usize,
}

impl QueryPlanCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            entries: RwLock::new(HashMap::new()),
            lru: Mutex::new(LruState::default()),
        }
    }

    /// Look up a plan by fingerprint, promoting it to most-recently-used.
    pub fn get(&self, fingerprint: &str) -> Option<Arc<QueryPlan>> {
        let plan = self.entries.read().get(fingerprint).cloned()?;

        let mut lru = self.lru.lock();
        if let Some(position) = lru.order.iter().position(|key| key == fingerprint) {
            let key = lru.order.remove(position);
            lru.order.push(key);
        }
        tracing::debug!(fingerprint = %fingerprint, "query plan cache hit");
        Some(plan)
    }

    /// Store a plan, evicting least-recently-used entries until it fits.
    ///
    /// A plan larger than the entire budget is rejected (debug-logged) rather
    /// than evicting everything else; this is not an error.
    pub fn insert(&self, fingerprint: &str, plan: Arc<QueryPlan>) -> Result<()> {
        let size = serde_json::to_vec(plan.as_ref())?.len();
        if size > self.max_bytes {
            tracing::debug!(
                fingerprint = %fingerprint,
                size,
                max_bytes = self.max_bytes,
                "query plan exceeds the whole cache budget; not cached"
            );
            return Ok(());
        }

        let mut lru = self.lru.lock();

        // Replace an existing entry for the same fingerprint.
        if let Some(previous) = lru.sizes.remove(fingerprint) {
            lru.total_bytes -= previous;
            lru.order.retain(|key| key != fingerprint);
            self.entries.write().remove(fingerprint);
        }

        while lru.total_bytes + size > self.max_bytes && !lru.order.is_empty() {
            let victim = lru.order.remove(0);
            if let Some(bytes) = lru.sizes.remove(&victim) {
                lru.total_bytes -= bytes;
            }
            self.entries.write().remove(&victim);
            tracing::debug!(fingerprint = %victim, "evicted least-recently-used query plan");
        }

        self.entries.write().insert(fingerprint.to_string(), plan);
        lru.sizes.insert(fingerprint.to_string(), size);
        lru.order.push(fingerprint.to_string());
        lru.total_bytes += size;
        Ok(())
    }

    /// Fire-and-forget insert; the outcome is only observed for logging.
    pub fn spawn_insert(self: &Arc<Self>, fingerprint: String, plan: Arc<QueryPlan>) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = cache.insert(&fingerprint, plan) {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    error = %err,
                    "failed to cache query plan"
                );
            }
        });
    }

    /// Unconditionally empty the cache.
    pub fn flush(&self) {
        let mut lru = self.lru.lock();
        lru.order.clear();
        lru.sizes.clear();
        lru.total_bytes = 0;
        self.entries.write().clear();
        tracing::debug!("query plan cache flushed");
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PlanCacheStats {
        let lru = self.lru.lock();
        PlanCacheStats {
            entries: lru.sizes.len(),
            approximate_bytes: lru.total_bytes,
            max_bytes: self.max_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(marker: &str) -> Arc<QueryPlan> {
        Arc::new(QueryPlan(json!({ "fetch": marker })))
    }

    fn size_of(plan: &QueryPlan) -> usize {
        serde_json::to_vec(plan).unwrap().len()
    }

    #[test]
    fn insert_then_get_returns_stored_plan() {
        let cache = QueryPlanCache::new(1024);
        let stored = plan("accounts");
        cache.insert("fp1", Arc::clone(&stored)).unwrap();

        let found = cache.get("fp1").expect("cached plan");
        assert_eq!(found.as_ref(), stored.as_ref());
        assert!(cache.get("fp2").is_none());
    }

    #[test]
    fn eviction_respects_lru_order() {
        let one = plan("a");
        // Budget fits exactly two entries of this size.
        let cache = QueryPlanCache::new(size_of(&one) * 2);

        cache.insert("fp-a", plan("a")).unwrap();
        cache.insert("fp-b", plan("b")).unwrap();

        // Touch fp-a so fp-b becomes the least recently used.
        cache.get("fp-a").unwrap();

        cache.insert("fp-c", plan("c")).unwrap();
        assert!(cache.get("fp-b").is_none(), "LRU entry evicted");
        assert!(cache.get("fp-a").is_some());
        assert!(cache.get("fp-c").is_some());
    }

    #[test]
    fn oversized_plan_is_rejected_without_evicting() {
        let small = plan("a");
        let cache = QueryPlanCache::new(size_of(&small));
        cache.insert("fp-small", small).unwrap();

        let huge = Arc::new(QueryPlan(json!({ "fetch": "x".repeat(4096) })));
        cache.insert("fp-huge", huge).unwrap();

        assert!(cache.get("fp-huge").is_none());
        assert!(cache.get("fp-small").is_some(), "existing entries untouched");
    }

    #[test]
    fn replacing_an_entry_keeps_byte_accounting_consistent() {
        let cache = QueryPlanCache::new(1024);
        cache.insert("fp", plan("first")).unwrap();
        let bytes_after_first = cache.stats().approximate_bytes;

        cache.insert("fp", plan("second-longer-plan")).unwrap();
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert!(stats.approximate_bytes > bytes_after_first);
        assert_eq!(
            cache.get("fp").unwrap().as_ref(),
            plan("second-longer-plan").as_ref()
        );
    }

    #[test]
    fn flush_empties_everything() {
        let cache = QueryPlanCache::new(1024);
        cache.insert("fp1", plan("a")).unwrap();
        cache.insert("fp2", plan("b")).unwrap();
        assert_eq!(cache.len(), 2);

        cache.flush();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().approximate_bytes, 0);
        assert!(cache.get("fp1").is_none());
    }

    #[tokio::test]
    async fn spawn_insert_populates_in_background() {
        let cache = Arc::new(QueryPlanCache::new(1024));
        cache.spawn_insert("fp".to_string(), plan("a"));

        // Wait for the detached task to land.
        for _ in 0..100 {
            if !cache.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(cache.get("fp").is_some());
    }
}
