//! 컴파일된 쿼리 계획 캐싱
//!
//! 같은 쿼리 텍스트를 다시 컴파일하지 않도록 `CompiledQuery`를 LRU로 보관합니다.

use crate::ppl::planner::{LogicalPlan, PhysicalPlan, PushdownDecision};
use arrow::datatypes::SchemaRef;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Output of compilation. Immutable; shared between executions.
#[derive(Debug)]
pub struct CompiledQuery {
    pub text: String,
    /// Pipeline command names, `search` first
    pub commands: Vec<&'static str>,
    /// Optimized logical plan
    pub logical: LogicalPlan,
    pub physical: PhysicalPlan,
    pub decisions: Vec<PushdownDecision>,
    /// Result schema
    pub schema: SchemaRef,
}

/// 컴파일 계획 캐시
pub struct PlanCache {
    /// `None` when caching is disabled
    inner: Option<Mutex<LruCache<String, Arc<CompiledQuery>>>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl PlanCache {
    /// Capacity 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    pub fn get(&self, text: &str) -> Option<Arc<CompiledQuery>> {
        let inner = self.inner.as_ref()?;
        let found = inner.lock().get(text).cloned();
        let counter = if found.is_some() {
            &self.hit_count
        } else {
            &self.miss_count
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, compiled: Arc<CompiledQuery>) {
        if let Some(inner) = &self.inner {
            inner.lock().put(compiled.text.clone(), compiled);
        }
    }

    pub fn clear(&self) {
        if let Some(inner) = &self.inner {
            inner.lock().clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.as_ref().map(|inner| inner.lock().len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.miss_count.load(Ordering::Relaxed)
    }

    /// 캐시 히트율 (0.0 ~ 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hit_count();
        let total = hits + self.miss_count();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppl::planner::PhysicalPlanner;
    use crate::schema::schema_from_pairs;
    use crate::config::PushdownConfig;
    use arrow::datatypes::DataType;

    fn compiled(text: &str) -> Arc<CompiledQuery> {
        let schema = schema_from_pairs([("a", DataType::Int64)]);
        let logical = LogicalPlan::Scan {
            source: "t".into(),
            table_schema: schema.clone(),
            columns: None,
            filter: None,
            statistics: None,
        };
        let (physical, decisions) =
            PhysicalPlanner::new(PushdownConfig::default(), 100).plan_explained(logical.clone());
        Arc::new(CompiledQuery {
            text: text.to_string(),
            commands: vec!["search"],
            logical,
            physical,
            decisions,
            schema,
        })
    }

    #[test]
    fn test_plan_cache_hits_and_eviction() {
        let cache = PlanCache::new(2);
        cache.insert(compiled("q1"));
        cache.insert(compiled("q2"));
        assert!(cache.get("q1").is_some());
        cache.insert(compiled("q3"));

        // q2 was least recently used
        assert!(cache.get("q2").is_none());
        assert!(cache.get("q3").is_some());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.hit_count(), 2);
        assert_eq!(cache.miss_count(), 1);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let cache = PlanCache::new(0);
        cache.insert(compiled("q1"));
        assert!(cache.get("q1").is_none());
        assert!(cache.is_empty());
    }
}
