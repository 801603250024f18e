// ── Query result envelopes ──
//
// The contract between the cache and its consumers. Callers never see
// the raw transport payload, only one of these shapes.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::record::Record;

/// Pagination metadata extracted from `data.pagination`.
///
/// Every field is optional: a missing block means "no more pages known".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_count: Option<u64>,
    pub total_pages: Option<u64>,
    pub current_page: Option<u64>,
}

impl Pagination {
    /// Tolerant extraction: non-numeric fields are treated as absent.
    pub fn from_value(block: Option<&Value>) -> Self {
        let field = |name: &str| block.and_then(|b| b.get(name)).and_then(as_count);
        Self {
            total_count: field("totalCount"),
            total_pages: field("totalPages"),
            current_page: field("currentPage"),
        }
    }

    /// Whether the server reported a page after `current_page`.
    pub fn has_next_page(&self) -> bool {
        matches!((self.current_page, self.total_pages), (Some(c), Some(t)) if c < t)
    }
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// `{ entity, Data, totalCount?, totalPages?, currentPage? }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListEnvelope {
    pub entity: String,
    #[serde(rename = "Data")]
    pub data: Vec<Arc<Record>>,
    #[serde(rename = "totalCount", skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(rename = "totalPages", skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    #[serde(rename = "currentPage", skip_serializing_if = "Option::is_none")]
    pub current_page: Option<u64>,
}

impl ListEnvelope {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            total_count: self.total_count,
            total_pages: self.total_pages,
            current_page: self.current_page,
        }
    }
}

/// `{ entity, Data }`. `Data` is `null` when the payload carried no object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemEnvelope {
    pub entity: String,
    #[serde(rename = "Data")]
    pub data: Option<Arc<Record>>,
}

/// `{ entity, Message, Data }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteEnvelope {
    pub entity: String,
    #[serde(rename = "Message")]
    pub message: Option<String>,
    #[serde(rename = "Data")]
    pub data: Value,
}

/// Null-wrapped single-record selector result: `{ "value": null }` when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemSelection {
    pub value: Option<Arc<Record>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pagination_absent_block_is_all_none() {
        assert_eq!(Pagination::from_value(None), Pagination::default());
    }

    #[test]
    fn pagination_accepts_numeric_strings() {
        let block = json!({ "totalCount": "40", "totalPages": 4, "currentPage": 1 });
        let p = Pagination::from_value(Some(&block));
        assert_eq!(p.total_count, Some(40));
        assert!(p.has_next_page());
    }

    #[test]
    fn list_envelope_serializes_contract_field_names() {
        let env = ListEnvelope {
            entity: "product".into(),
            data: vec![Arc::new(json!({ "id": 1 }))],
            total_count: Some(1),
            total_pages: None,
            current_page: None,
        };
        assert_eq!(
            serde_json::to_value(&env).unwrap_or_default(),
            json!({ "entity": "product", "Data": [{ "id": 1 }], "totalCount": 1 })
        );
    }

    #[test]
    fn empty_selection_serializes_as_null_value() {
        assert_eq!(
            serde_json::to_value(ItemSelection::default()).unwrap_or_default(),
            json!({ "value": null })
        );
    }
}
