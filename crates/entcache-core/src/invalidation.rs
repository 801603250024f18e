// ── List invalidation ──
//
// Each entity type has a monotonic list generation. Every cached list
// page remembers the generation it was fetched under; a mutation bumps
// the generation and every page for that type is stale from then on.

use std::sync::Arc;

use dashmap::DashMap;
use entcache_api::Filters;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::model::ListEnvelope;

/// Canonical identity of a list read.
///
/// Filters are a sorted map, so their JSON text is canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListQueryKey {
    pub entity: String,
    pub page: u32,
    pub limit: u32,
    filters: String,
}

impl ListQueryKey {
    pub fn new(entity: &str, page: u32, limit: u32, filters: &Filters) -> Self {
        let filters = if filters.is_empty() {
            String::new()
        } else {
            serde_json::to_string(filters).unwrap_or_default()
        };
        Self {
            entity: entity.to_owned(),
            page,
            limit,
            filters,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedList {
    generation: u64,
    envelope: Arc<ListEnvelope>,
}

/// Per-entity list generations plus the list query cache they guard.
#[derive(Default)]
pub struct Invalidator {
    generations: DashMap<String, watch::Sender<u64>>,
    lists: DashMap<ListQueryKey, CachedList>,
}

impl Invalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current list generation of an entity type (0 until first invalidation).
    pub fn list_generation(&self, entity: &str) -> u64 {
        self.generations
            .get(entity)
            .map_or(0, |slot| *slot.borrow())
    }

    /// Mark every cached list of `entity` stale. Returns the new generation.
    pub fn invalidate_lists(&self, entity: &str) -> u64 {
        let slot = self
            .generations
            .entry(entity.to_owned())
            .or_insert_with(|| watch::channel(0).0);
        slot.send_modify(|generation| *generation += 1);
        let generation = *slot.borrow();
        drop(slot);

        self.lists.retain(|key, _| key.entity != entity);
        debug!(entity, generation, "list queries invalidated");
        generation
    }

    /// Watch an entity type's list generation; each change means
    /// active list views should refetch.
    pub fn subscribe_invalidations(&self, entity: &str) -> watch::Receiver<u64> {
        self.generations
            .entry(entity.to_owned())
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    /// The cached page for `key`, if it was fetched under the current generation.
    pub fn fresh(&self, key: &ListQueryKey) -> Option<Arc<ListEnvelope>> {
        let cached = self.lists.get(key)?;
        if cached.generation == self.list_generation(&key.entity) {
            trace!(entity = %key.entity, page = key.page, "list query cache hit");
            Some(Arc::clone(&cached.envelope))
        } else {
            None
        }
    }

    /// Remember a fetched page under the generation captured before the fetch.
    ///
    /// If the type was invalidated while the fetch was in flight, the
    /// entry is already stale and the next read refetches.
    pub fn insert(&self, key: ListQueryKey, generation: u64, envelope: Arc<ListEnvelope>) {
        self.lists.insert(
            key,
            CachedList {
                generation,
                envelope,
            },
        );
    }

    /// Number of cached list pages.
    pub fn cached_lists(&self) -> usize {
        self.lists.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(entity: &str) -> Arc<ListEnvelope> {
        Arc::new(ListEnvelope {
            entity: entity.into(),
            data: Vec::new(),
            total_count: None,
            total_pages: None,
            current_page: None,
        })
    }

    #[test]
    fn key_is_canonical_over_filter_insertion_order() {
        let mut a = Filters::new();
        a.insert("b".into(), json!(2));
        a.insert("a".into(), json!("x"));
        let mut b = Filters::new();
        b.insert("a".into(), json!("x"));
        b.insert("b".into(), json!(2));
        assert_eq!(
            ListQueryKey::new("product", 1, 10, &a),
            ListQueryKey::new("product", 1, 10, &b)
        );
        assert_ne!(
            ListQueryKey::new("product", 1, 10, &a),
            ListQueryKey::new("product", 2, 10, &a)
        );
    }

    #[test]
    fn fresh_until_invalidated() {
        let inv = Invalidator::new();
        let key = ListQueryKey::new("product", 1, 10, &Filters::new());
        let generation = inv.list_generation("product");
        inv.insert(key.clone(), generation, envelope("product"));
        assert!(inv.fresh(&key).is_some());

        assert_eq!(inv.invalidate_lists("product"), 1);
        assert!(inv.fresh(&key).is_none());
    }

    #[test]
    fn insert_under_superseded_generation_is_stale() {
        let inv = Invalidator::new();
        let key = ListQueryKey::new("product", 1, 10, &Filters::new());
        let captured = inv.list_generation("product");
        inv.invalidate_lists("product");
        inv.insert(key.clone(), captured, envelope("product"));
        assert!(inv.fresh(&key).is_none());
    }

    #[test]
    fn invalidation_is_per_entity() {
        let inv = Invalidator::new();
        let key = ListQueryKey::new("review", 1, 10, &Filters::new());
        inv.insert(key.clone(), 0, envelope("review"));
        inv.invalidate_lists("product");
        assert!(inv.fresh(&key).is_some());
        assert_eq!(inv.cached_lists(), 1);
    }

    #[tokio::test]
    async fn subscribers_see_generation_bumps() {
        let inv = Invalidator::new();
        let mut rx = inv.subscribe_invalidations("product");
        assert_eq!(*rx.borrow(), 0);

        inv.invalidate_lists("product");
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
    }
}
