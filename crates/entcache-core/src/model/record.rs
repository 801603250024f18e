// ── Record shape helpers ──
//
// Records are schemaless JSON objects. The cache only relies on an id
// field, a creation timestamp, and the `reactions` counters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A cached entity instance.
pub type Record = Value;

/// Field the normalizer writes when a record carries no creation time.
pub const CREATED_AT: &str = "createdAt";
/// Snake-case spelling some resources use instead.
pub const CREATED_AT_SNAKE: &str = "created_at";
/// Field holding the engagement counters.
pub const REACTIONS: &str = "reactions";

/// Engagement counters attached to every record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reactions {
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
}

impl Reactions {
    pub fn new(views: u64, likes: u64) -> Self {
        Self { views, likes }
    }

    /// Read the counters of a record, if it carries a well-formed `reactions` object.
    pub fn of(record: &Record) -> Option<Self> {
        record
            .get(REACTIONS)
            .filter(|r| r.is_object())
            .and_then(|r| serde_json::from_value(r.clone()).ok())
    }

    pub fn to_value(self) -> Value {
        json!({ "views": self.views, "likes": self.likes })
    }
}

/// Whether the record already carries a creation timestamp under either spelling.
pub fn has_created_at(record: &Map<String, Value>) -> bool {
    [CREATED_AT, CREATED_AT_SNAKE]
        .iter()
        .any(|key| record.get(*key).is_some_and(|v| !v.is_null()))
}

/// The optimistic patch that sets a record's `reactions` object.
pub fn reactions_patch(reactions: Reactions) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert(REACTIONS.into(), reactions.to_value());
    patch
}
