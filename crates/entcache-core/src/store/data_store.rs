// ── Central reactive data store ──
//
// One collection per entity-type name, created lazily on first write.
// Every write swaps the collection `Arc` through a `watch` sender, so
// subscribers get pushed snapshots and selectors can compare by identity.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use tokio::sync::watch;
use tracing::debug;

use super::collection::EntityCollection;
use crate::model::{EntityId, Record};
use crate::stream::EntityStream;

type Slot = watch::Sender<Arc<EntityCollection>>;

/// Normalized store of every cached entity type.
///
/// Writes for one entity type are serialized by that type's `watch`
/// sender: a normalize-then-upsert runs to completion before the next
/// write to the same type begins. Readers take cheap `Arc` snapshots
/// and never block writers for longer than a clone.
#[doc(alias = "SharedState")]
pub struct DataStore {
    collections: DashMap<String, Slot>,
    last_write: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    pub fn new() -> Self {
        let (last_write, _) = watch::channel(None);
        Self {
            collections: DashMap::new(),
            last_write,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current snapshot of an entity type, or `None` if it was never populated.
    pub fn collection(&self, entity: &str) -> Option<Arc<EntityCollection>> {
        self.collections.get(entity).map(|slot| slot.borrow().clone())
    }

    pub fn get_one(&self, entity: &str, id: &EntityId) -> Option<Arc<Record>> {
        self.collection(entity)?.get(id).cloned()
    }

    pub fn get_many(&self, entity: &str, ids: &[EntityId]) -> Vec<Arc<Record>> {
        self.collection(entity)
            .map(|col| col.get_many(ids))
            .unwrap_or_default()
    }

    /// Known entity-type names, sorted.
    pub fn entity_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self, entity: &str) -> usize {
        self.collection(entity).map_or(0, |col| col.len())
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Merge a batch into an entity type (merge-by-id).
    ///
    /// Returns the number of ids that were new. A batch that changes
    /// nothing leaves the collection `Arc` untouched, so memoized
    /// selectors and subscribers see no change.
    pub fn upsert_many(&self, entity: &str, records: Vec<(EntityId, Arc<Record>)>) -> usize {
        self.update_with(entity, |_| records)
    }

    /// Read-modify-write under the entity type's write lock.
    ///
    /// `build` sees the current snapshot and returns the batch to merge.
    /// No other write to `entity` can land between the two. `build` must
    /// not call back into this store for the same entity type.
    pub fn update_with(
        &self,
        entity: &str,
        build: impl FnOnce(&EntityCollection) -> Vec<(EntityId, Arc<Record>)>,
    ) -> usize {
        let slot = self.slot(entity);
        let mut added = 0;
        let changed = slot.send_if_modified(|current| {
            let records = build(current);
            let dirty = records
                .iter()
                .any(|(id, record)| current.get(id) != Some(record));
            if !dirty {
                return false;
            }
            let mut next = current.next_version();
            added = next.upsert_many(records);
            *current = Arc::new(next);
            true
        });
        drop(slot);

        if changed {
            debug!(entity, added, "collection updated");
            self.touch();
        }
        added
    }

    /// Insert or overwrite a single record. Returns `true` if the id was new.
    pub fn upsert_one(&self, entity: &str, id: EntityId, record: Arc<Record>) -> bool {
        self.upsert_many(entity, vec![(id, record)]) > 0
    }

    /// Remove a record and its id atomically. Absent ids are a no-op.
    pub fn remove_one(&self, entity: &str, id: &EntityId) -> Option<Arc<Record>> {
        let slot = self.collections.get(entity)?;
        let mut removed = None;
        slot.send_if_modified(|current| {
            if !current.contains(id) {
                return false;
            }
            let mut next = current.next_version();
            removed = next.remove(id);
            *current = Arc::new(next);
            true
        });
        drop(slot);

        if removed.is_some() {
            debug!(entity, %id, "record removed");
            self.touch();
        }
        removed
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Subscribe to an entity type, creating an empty collection if needed.
    pub fn subscribe(&self, entity: &str) -> EntityStream {
        EntityStream::new(self.slot(entity).subscribe())
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_write(&self) -> Option<DateTime<Utc>> {
        *self.last_write.borrow()
    }

    /// How long ago the store last changed, or `None` if it never has.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_write().map(|t| Utc::now() - t)
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn slot(&self, entity: &str) -> Ref<'_, String, Slot> {
        if let Some(slot) = self.collections.get(entity) {
            return slot;
        }
        self.collections
            .entry(entity.to_owned())
            .or_insert_with(|| watch::channel(Arc::default()).0)
            .downgrade()
    }

    fn touch(&self) {
        let _ = self.last_write.send(Some(Utc::now()));
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
