// ── Response normalization ──
//
// Raw payloads in, envelopes and storable records out. The read path
// never fails: a missing list becomes empty, missing pagination becomes
// `None`, malformed reactions become zeroed counters. Only the write
// path reports a payload it cannot make sense of.

use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use entcache_api::Filters;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::RecommendationRule;
use crate::error::CoreError;
use crate::model::record::{self, CREATED_AT, REACTIONS};
use crate::model::{
    EntityId, ItemEnvelope, ListEnvelope, Pagination, Reactions, Record, WriteEnvelope,
};
use crate::store::DataStore;

// ── Normalized output ───────────────────────────────────────────────

/// A record after defaulting, before it is handed to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    /// `None` when the record carried none of the configured id fields.
    pub id: Option<EntityId>,
    pub record: Record,
    created_at_backfilled: bool,
}

impl NormalizedRecord {
    /// Whether `createdAt` was synthesized rather than read from the payload.
    pub fn created_at_backfilled(&self) -> bool {
        self.created_at_backfilled
    }

    /// Keep a previously backfilled `createdAt` instead of a fresh one.
    ///
    /// Re-normalizing the same raw record would otherwise produce a new
    /// "now minus one minute" on every fetch.
    fn stabilize(&mut self, store: &DataStore, entity: &str) {
        if !self.created_at_backfilled {
            return;
        }
        let Some(id) = &self.id else { return };
        let Some(existing) = store.get_one(entity, id) else {
            return;
        };
        let Some(stored) = existing.get(CREATED_AT).filter(|v| !v.is_null()) else {
            return;
        };
        if let Some(obj) = self.record.as_object_mut() {
            obj.insert(CREATED_AT.into(), stored.clone());
        }
    }
}

/// A normalized list page, ready to be stored and returned.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedList {
    /// Collection the records belong to (re-tagged for recommendations).
    pub entity: String,
    pub records: Vec<NormalizedRecord>,
    pub pagination: Pagination,
}

impl NormalizedList {
    /// Carry stored `createdAt` values over backfilled ones.
    pub fn stabilize(&mut self, store: &DataStore) {
        for record in &mut self.records {
            record.stabilize(store, &self.entity);
        }
    }

    /// Records that can be keyed, in payload order.
    pub fn storable(&self) -> Vec<(EntityId, Arc<Record>)> {
        self.records
            .iter()
            .filter_map(|r| Some((r.id.clone()?, Arc::new(r.record.clone()))))
            .collect()
    }

    pub fn into_envelope(self) -> ListEnvelope {
        ListEnvelope {
            entity: self.entity,
            data: self
                .records
                .into_iter()
                .map(|r| Arc::new(r.record))
                .collect(),
            total_count: self.pagination.total_count,
            total_pages: self.pagination.total_pages,
            current_page: self.pagination.current_page,
        }
    }
}

/// A normalized single-item read.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedItem {
    pub entity: String,
    pub record: Option<NormalizedRecord>,
}

impl NormalizedItem {
    pub fn stabilize(&mut self, store: &DataStore) {
        if let Some(record) = &mut self.record {
            record.stabilize(store, &self.entity);
        }
    }

    pub fn into_envelope(self) -> ItemEnvelope {
        ItemEnvelope {
            entity: self.entity,
            data: self.record.map(|r| Arc::new(r.record)),
        }
    }
}

// ── Normalizer ──────────────────────────────────────────────────────

/// Shapes raw transport payloads into envelopes and defaulted records.
#[derive(Debug, Clone)]
pub struct Normalizer {
    id_fields: Vec<String>,
    recommendation: RecommendationRule,
}

impl Normalizer {
    pub fn new(id_fields: Vec<String>, recommendation: RecommendationRule) -> Self {
        Self {
            id_fields,
            recommendation,
        }
    }

    /// Normalize a `{ data: { list, pagination } }` payload.
    pub fn normalize_list(&self, entity: &str, filters: &Filters, raw: &Value) -> NormalizedList {
        let data = raw.get("data");
        let list: &[Value] = match data.and_then(|d| d.get("list")) {
            Some(Value::Array(items)) => items.as_slice(),
            Some(other) => {
                warn!(entity, kind = json_kind(other), "list payload is not an array, treating as empty");
                &[]
            }
            None => {
                debug!(entity, "list payload carried no list");
                &[]
            }
        };
        let pagination = Pagination::from_value(data.and_then(|d| d.get("pagination")));

        let stamp = self.recommendation_stamp(entity, filters);
        let target = if stamp.is_some() {
            self.recommendation.tagged_entity()
        } else {
            entity.to_owned()
        };

        let mut records = Vec::with_capacity(list.len());
        for item in list {
            let Some(obj) = item.as_object() else {
                warn!(entity, kind = json_kind(item), "dropping non-object list entry");
                continue;
            };
            let mut normalized = self.normalize_object(obj.clone());
            if let Some(profile) = &stamp {
                if let Some(map) = normalized.record.as_object_mut() {
                    map.insert(self.recommendation.profile_field.clone(), profile.clone());
                }
            }
            if normalized.id.is_none() {
                warn!(entity, "record has no id field, returning it without caching");
            }
            records.push(normalized);
        }

        NormalizedList {
            entity: target,
            records,
            pagination,
        }
    }

    /// Normalize a `{ data }` payload. A missing or non-object `data` is `None`.
    pub fn normalize_item(&self, entity: &str, raw: &Value) -> NormalizedItem {
        let record = match raw.get("data") {
            Some(Value::Object(obj)) => Some(self.normalize_object(obj.clone())),
            Some(Value::Null) | None => None,
            Some(other) => {
                warn!(entity, kind = json_kind(other), "item payload is not an object");
                None
            }
        };
        NormalizedItem {
            entity: entity.to_owned(),
            record,
        }
    }

    /// Normalize a `{ data, msg }` write acknowledgement.
    ///
    /// An empty body (`null`) is an acknowledgement without message or
    /// data. Anything other than an object or `null` is malformed.
    pub fn normalize_write(entity: &str, raw: &Value) -> Result<WriteEnvelope, CoreError> {
        let obj = match raw {
            Value::Object(obj) => Some(obj),
            Value::Null => None,
            other => {
                return Err(CoreError::MalformedResponse {
                    entity: entity.to_owned(),
                    message: format!("expected an object, got {}", json_kind(other)),
                });
            }
        };
        let field = |name: &str| obj.and_then(|o| o.get(name));
        let message = field("msg")
            .or_else(|| field("message"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(WriteEnvelope {
            entity: entity.to_owned(),
            message,
            data: field("data").cloned().unwrap_or(Value::Null),
        })
    }

    /// Read a record's id from the first configured field that holds one.
    pub fn record_id(&self, record: &Map<String, Value>) -> Option<EntityId> {
        self.id_fields
            .iter()
            .find_map(|field| record.get(field).and_then(EntityId::from_value))
    }

    fn normalize_object(&self, mut obj: Map<String, Value>) -> NormalizedRecord {
        let id = self.record_id(&obj);
        let created_at_backfilled = backfill(&mut obj);
        NormalizedRecord {
            id,
            record: Value::Object(obj),
            created_at_backfilled,
        }
    }

    /// Profile id to stamp on records, when this read is a recommendation read.
    fn recommendation_stamp(&self, entity: &str, filters: &Filters) -> Option<Value> {
        let rule = &self.recommendation;
        if entity != rule.entity || !filters.get(&rule.trigger_filter).is_some_and(flag_set) {
            return None;
        }
        Some(
            filters
                .get(&rule.profile_filter)
                .cloned()
                .unwrap_or(Value::Null),
        )
    }
}

// ── Record defaulting ───────────────────────────────────────────────

/// Fill `createdAt` and `reactions` in place. Returns whether
/// `createdAt` was synthesized.
///
/// Present values are never touched, so applying this twice to the
/// same record is a no-op the second time.
pub fn backfill(obj: &mut Map<String, Value>) -> bool {
    let created = !record::has_created_at(obj);
    if created {
        let stamp = (Utc::now() - Duration::minutes(1)).to_rfc3339_opts(SecondsFormat::Millis, true);
        obj.insert(CREATED_AT.into(), Value::String(stamp));
    }

    match obj.get_mut(REACTIONS) {
        Some(Value::Object(counters)) => {
            for key in ["views", "likes"] {
                counters.entry(key).or_insert(Value::from(0u64));
            }
        }
        _ => {
            obj.insert(REACTIONS.into(), Reactions::default().to_value());
        }
    }
    created
}

/// Truthiness of a filter flag: `null`, `false`, `0`, `""`, and `[]` are unset.
fn flag_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn normalizer() -> Normalizer {
        Normalizer::new(crate::config::default_id_fields(), RecommendationRule::default())
    }

    #[test]
    fn existing_created_at_is_preserved() {
        let raw = json!({ "data": { "list": [
            { "id": 1, "createdAt": "2024-01-01T00:00:00Z" },
            { "id": 2, "created_at": "2023-06-01T00:00:00Z" },
        ] } });
        let list = normalizer().normalize_list("product", &Filters::new(), &raw);

        assert_eq!(list.records[0].record["createdAt"], "2024-01-01T00:00:00Z");
        assert!(!list.records[0].created_at_backfilled());
        assert_eq!(list.records[1].record["created_at"], "2023-06-01T00:00:00Z");
        assert!(list.records[1].record.get("createdAt").is_none());
    }

    #[test]
    fn missing_created_at_is_backfilled_in_the_past() {
        let raw = json!({ "data": { "list": [{ "id": 1 }] } });
        let list = normalizer().normalize_list("product", &Filters::new(), &raw);
        let record = &list.records[0];
        assert!(record.created_at_backfilled());

        let stamp = record.record["createdAt"].as_str().unwrap();
        let parsed = chrono::DateTime::parse_from_rfc3339(stamp).unwrap();
        assert!(parsed < Utc::now());
    }

    #[test]
    fn backfill_is_idempotent() {
        let mut obj = json!({ "id": 1 }).as_object().cloned().unwrap();
        assert!(backfill(&mut obj));
        let once = obj.clone();
        assert!(!backfill(&mut obj));
        assert_eq!(obj, once);
    }

    #[test]
    fn reactions_are_defaulted_and_completed() {
        let raw = json!({ "data": { "list": [
            { "id": 1 },
            { "id": 2, "reactions": "lots" },
            { "id": 3, "reactions": { "views": 9 } },
        ] } });
        let list = normalizer().normalize_list("product", &Filters::new(), &raw);
        assert_eq!(list.records[0].record["reactions"], json!({ "views": 0, "likes": 0 }));
        assert_eq!(list.records[1].record["reactions"], json!({ "views": 0, "likes": 0 }));
        assert_eq!(list.records[2].record["reactions"], json!({ "views": 9, "likes": 0 }));
    }

    #[test]
    fn malformed_list_payloads_degrade() {
        let n = normalizer();
        for raw in [json!(null), json!({}), json!({ "data": { "list": "nope" } })] {
            let list = n.normalize_list("product", &Filters::new(), &raw);
            assert!(list.records.is_empty());
            assert_eq!(list.pagination, Pagination::default());
        }
    }

    #[test]
    fn pagination_is_extracted() {
        let raw = json!({ "data": {
            "list": [],
            "pagination": { "totalCount": 40, "totalPages": 2, "currentPage": 1 },
        } });
        let env = normalizer()
            .normalize_list("product", &Filters::new(), &raw)
            .into_envelope();
        assert_eq!(env.total_count, Some(40));
        assert_eq!(env.total_pages, Some(2));
        assert_eq!(env.current_page, Some(1));
    }

    #[test]
    fn records_without_id_are_returned_but_not_storable() {
        let raw = json!({ "data": { "list": [{ "title": "anon" }, { "_id": "a1" }, 7] } });
        let list = normalizer().normalize_list("product", &Filters::new(), &raw);
        assert_eq!(list.records.len(), 2);
        let storable = list.storable();
        assert_eq!(storable.len(), 1);
        assert_eq!(storable[0].0, EntityId::from("a1"));
    }

    #[test]
    fn recommend_by_tag_retags_and_stamps_profile() {
        let mut filters = Filters::new();
        filters.insert("recommendByTags".into(), json!(true));
        filters.insert("profileId".into(), json!("p-42"));
        let raw = json!({ "data": { "list": [{ "id": 1 }, { "id": 2 }] } });

        let env = normalizer()
            .normalize_list("opportunity", &filters, &raw)
            .into_envelope();
        assert_eq!(env.entity, "opportunityrecommendation");
        assert!(env.data.iter().all(|r| r["profile_id"] == "p-42"));
    }

    #[test]
    fn unset_recommend_flag_leaves_entity_alone() {
        let n = normalizer();
        let raw = json!({ "data": { "list": [{ "id": 1 }] } });
        for flag in [json!(false), json!(null), json!("")] {
            let mut filters = Filters::new();
            filters.insert("recommendByTags".into(), flag);
            let list = n.normalize_list("opportunity", &filters, &raw);
            assert_eq!(list.entity, "opportunity");
            assert!(list.records[0].record.get("profile_id").is_none());
        }

        let mut filters = Filters::new();
        filters.insert("recommendByTags".into(), json!(true));
        assert_eq!(n.normalize_list("product", &filters, &raw).entity, "product");
    }

    #[test]
    fn stabilize_reuses_stored_timestamp() {
        let store = DataStore::new();
        let n = normalizer();
        let raw = json!({ "data": { "list": [{ "id": 1 }] } });

        let first = n.normalize_list("product", &Filters::new(), &raw);
        store.upsert_many("product", first.storable());
        let stored = store.get_one("product", &EntityId::from("1")).unwrap()["createdAt"].clone();

        let mut second = n.normalize_list("product", &Filters::new(), &raw);
        second.stabilize(&store);
        assert_eq!(second.records[0].record["createdAt"], stored);
    }

    #[test]
    fn item_payloads() {
        let n = normalizer();
        let item = n.normalize_item("product", &json!({ "data": { "id": "x" } }));
        assert_eq!(item.record.as_ref().unwrap().id, Some(EntityId::from("x")));
        assert!(n.normalize_item("product", &json!({ "data": null })).record.is_none());
        assert!(n.normalize_item("product", &json!({ "data": [1] })).record.is_none());
    }

    #[test]
    fn write_payloads() {
        let env =
            Normalizer::normalize_write("product", &json!({ "msg": "created", "data": { "id": 3 } }))
                .unwrap();
        assert_eq!(env.message.as_deref(), Some("created"));
        assert_eq!(env.data, json!({ "id": 3 }));

        let empty = Normalizer::normalize_write("product", &Value::Null).unwrap();
        assert_eq!(empty.message, None);
        assert_eq!(empty.data, Value::Null);

        let err = Normalizer::normalize_write("product", &json!("ok")).unwrap_err();
        assert!(matches!(err, CoreError::MalformedResponse { .. }));
    }
}
