// ── Memoized selectors ──
//
// Pure derivations over DataStore snapshots. Each result is cached per
// argument tuple together with the version of the collection it was
// computed from; a call with the same arguments against the same
// version returns the cached `Arc` without recomputing. Memos only hold
// outputs, never the snapshot itself.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::model::{EntityId, ItemSelection, Record};
use crate::store::{DataStore, EntityCollection};

/// Ordered list of records, as returned by list selectors.
pub type RecordList = Arc<Vec<Arc<Record>>>;

/// A cached output and the collection version it was derived from.
struct Memo<T> {
    version: u64,
    output: T,
}

impl<T: Clone> Memo<T> {
    fn of(collection: &EntityCollection, output: &T) -> Self {
        Self {
            version: collection.version(),
            output: output.clone(),
        }
    }

    fn hit(&self, collection: &EntityCollection) -> Option<T> {
        (self.version == collection.version()).then(|| self.output.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FieldKey {
    entity: String,
    field: String,
    value: String,
}

/// Memoizing selector layer.
///
/// Selectors never fail: missing arguments or absent collections degrade
/// to an empty list or a null-wrapped item, and a diagnostic is logged.
pub struct Selectors {
    lists: DashMap<String, Memo<RecordList>>,
    by_field: DashMap<FieldKey, Memo<RecordList>>,
    by_guid: DashMap<(String, EntityId), Memo<Arc<ItemSelection>>>,
    /// Last collection version each entity's keyed memos were swept at.
    swept: DashMap<String, u64>,
    empty_list: RecordList,
    empty_item: Arc<ItemSelection>,
}

impl Selectors {
    pub fn new() -> Self {
        Self {
            lists: DashMap::new(),
            by_field: DashMap::new(),
            by_guid: DashMap::new(),
            swept: DashMap::new(),
            empty_list: Arc::new(Vec::new()),
            empty_item: Arc::new(ItemSelection::default()),
        }
    }

    /// All records of an entity type, in canonical `ids` order.
    pub fn select_list(&self, store: &DataStore, entity: &str) -> RecordList {
        if entity.is_empty() {
            debug!("select_list: missing entity type");
            return Arc::clone(&self.empty_list);
        }
        let Some(collection) = store.collection(entity) else {
            trace!(entity, "select_list: entity type not cached");
            return Arc::clone(&self.empty_list);
        };

        if let Some(hit) = self.lists.get(entity).and_then(|memo| memo.hit(&collection)) {
            trace!(entity, "select_list: memo hit");
            return hit;
        }

        let output: RecordList = Arc::new(collection.records().cloned().collect());
        self.lists
            .insert(entity.to_owned(), Memo::of(&collection, &output));
        output
    }

    /// A single record by id, or `{ value: null }` when any part is missing.
    pub fn select_one_item_by_guid(
        &self,
        store: &DataStore,
        entity: &str,
        id: &str,
    ) -> Arc<ItemSelection> {
        if entity.is_empty() || id.is_empty() {
            debug!(entity, id, "select_one_item_by_guid: missing entity type or id");
            return Arc::clone(&self.empty_item);
        }
        let Some(collection) = store.collection(entity) else {
            trace!(entity, "select_one_item_by_guid: entity type not cached");
            return Arc::clone(&self.empty_item);
        };

        let key = (entity.to_owned(), EntityId::from(id));
        if let Some(hit) = self.by_guid.get(&key).and_then(|memo| memo.hit(&collection)) {
            return hit;
        }
        self.sweep(entity, &collection);

        let output = match collection.get(&key.1) {
            Some(record) if is_truthy(record) => Arc::new(ItemSelection {
                value: Some(Arc::clone(record)),
            }),
            _ => Arc::clone(&self.empty_item),
        };
        self.by_guid.insert(key, Memo::of(&collection, &output));
        output
    }

    /// Records whose `field` strictly equals `value`, in canonical order.
    ///
    /// Equality is JSON equality: `"1"` does not match `1`. A `null`
    /// value counts as a missing argument.
    pub fn select_many_items_by_field(
        &self,
        store: &DataStore,
        entity: &str,
        field: &str,
        value: &Value,
    ) -> RecordList {
        if entity.is_empty() || field.is_empty() || value.is_null() {
            debug!(entity, field, "select_many_items_by_field: missing argument");
            return Arc::clone(&self.empty_list);
        }
        let Some(collection) = store.collection(entity) else {
            trace!(entity, "select_many_items_by_field: entity type not cached");
            return Arc::clone(&self.empty_list);
        };

        let key = FieldKey {
            entity: entity.to_owned(),
            field: field.to_owned(),
            value: value.to_string(),
        };
        if let Some(hit) = self.by_field.get(&key).and_then(|memo| memo.hit(&collection)) {
            trace!(entity, field, "select_many_items_by_field: memo hit");
            return hit;
        }
        self.sweep(entity, &collection);

        let output: RecordList = Arc::new(
            collection
                .records()
                .filter(|record| record.get(field) == Some(value))
                .cloned()
                .collect(),
        );
        self.by_field.insert(key, Memo::of(&collection, &output));
        output
    }

    /// Drop keyed memos of `entity` computed against an older version.
    ///
    /// Runs at most once per collection version.
    fn sweep(&self, entity: &str, collection: &EntityCollection) {
        let version = collection.version();
        if self.swept.get(entity).is_some_and(|v| *v == version) {
            return;
        }
        self.by_guid
            .retain(|(e, _), memo| e != entity || memo.version == version);
        self.by_field
            .retain(|key, memo| key.entity != entity || memo.version == version);
        self.swept.insert(entity.to_owned(), version);
        trace!(entity, version, "swept stale memos");
    }

    /// Number of memoized results currently held.
    pub fn memo_count(&self) -> usize {
        self.lists.len() + self.by_field.len() + self.by_guid.len()
    }
}

impl Default for Selectors {
    fn default() -> Self {
        Self::new()
    }
}

/// Mirrors JavaScript-style truthiness for stored records: `null`,
/// `false`, `0`, and `""` count as missing.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
