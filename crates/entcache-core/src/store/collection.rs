// ── Normalized per-entity-type storage ──
//
// Ordered id → record map. Values are treated as immutable snapshots:
// the DataStore clones, mutates, and swaps whole collections so that
// `Arc` identity signals "changed".

use std::sync::Arc;

use indexmap::IndexMap;

use crate::model::{EntityId, Record};

/// Storage for a single entity type.
///
/// `ids` order is insertion order with no duplicates, and every id maps
/// to exactly one record. Both hold by construction: `IndexMap` keeps a
/// single ordered key set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityCollection {
    entities: IndexMap<EntityId, Arc<Record>>,
    version: u64,
}

impl EntityCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch by id: new ids are appended, existing ids are
    /// overwritten in place, ids absent from the batch are kept.
    /// Returns how many ids were new.
    pub(crate) fn upsert_many(
        &mut self,
        records: impl IntoIterator<Item = (EntityId, Arc<Record>)>,
    ) -> usize {
        let mut added = 0;
        for (id, record) in records {
            if self.upsert(id, record) {
                added += 1;
            }
        }
        added
    }

    /// Insert or overwrite one record. Returns `true` if the id was new.
    pub(crate) fn upsert(&mut self, id: EntityId, record: Arc<Record>) -> bool {
        self.entities.insert(id, record).is_none()
    }

    /// Remove an id and its record together, keeping the order of the rest.
    pub(crate) fn remove(&mut self, id: &EntityId) -> Option<Arc<Record>> {
        self.entities.shift_remove(id)
    }

    /// Write count of the owning store slot; 0 for a collection never written.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Clone for the next write, with the version advanced.
    pub(crate) fn next_version(&self) -> Self {
        Self {
            entities: self.entities.clone(),
            version: self.version + 1,
        }
    }

    pub fn get(&self, id: &EntityId) -> Option<&Arc<Record>> {
        self.entities.get(id)
    }

    /// Records for the given ids, in the order requested. Unknown ids are skipped.
    pub fn get_many<'a>(&self, ids: impl IntoIterator<Item = &'a EntityId>) -> Vec<Arc<Record>> {
        ids.into_iter()
            .filter_map(|id| self.entities.get(id).map(Arc::clone))
            .collect()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Ids in canonical list order.
    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    /// Records in canonical list order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: u64, name: &str) -> (EntityId, Arc<Record>) {
        (
            EntityId::from(id.to_string()),
            Arc::new(json!({ "id": id, "name": name })),
        )
    }

    #[test]
    fn upsert_many_appends_new_ids_in_order() {
        let mut col = EntityCollection::new();
        assert_eq!(col.upsert_many([rec(1, "a"), rec(2, "b")]), 2);
        assert_eq!(col.upsert_many([rec(3, "c")]), 1);

        let ids: Vec<String> = col.ids().map(ToString::to_string).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn upsert_overwrites_in_place() {
        let mut col = EntityCollection::new();
        col.upsert_many([rec(1, "a"), rec(2, "b"), rec(3, "c")]);
        assert_eq!(col.upsert_many([rec(2, "B"), rec(4, "d")]), 1);

        let names: Vec<&str> = col
            .records()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["a", "B", "c", "d"]);
    }

    #[test]
    fn upsert_many_is_idempotent() {
        let batch = [rec(1, "a"), rec(2, "b")];
        let mut once = EntityCollection::new();
        once.upsert_many(batch.clone());

        let mut twice = EntityCollection::new();
        twice.upsert_many(batch.clone());
        twice.upsert_many(batch);

        assert_eq!(once, twice);
    }

    #[test]
    fn remove_drops_id_and_record_together() {
        let mut col = EntityCollection::new();
        col.upsert_many([rec(1, "a"), rec(2, "b"), rec(3, "c")]);

        let removed = col.remove(&EntityId::from("2")).unwrap();
        assert_eq!(removed["name"], "b");
        assert!(!col.contains(&EntityId::from("2")));
        assert_eq!(col.len(), 2);

        let ids: Vec<String> = col.ids().map(ToString::to_string).collect();
        assert_eq!(ids, ["1", "3"]);
    }

    #[test]
    fn get_many_follows_requested_order_and_skips_unknown() {
        let mut col = EntityCollection::new();
        col.upsert_many([rec(1, "a"), rec(2, "b")]);

        let wanted = [EntityId::from("2"), EntityId::from("9"), EntityId::from("1")];
        let names: Vec<String> = col
            .get_many(&wanted)
            .iter()
            .map(|r| r["name"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["b", "a"]);
    }
}
