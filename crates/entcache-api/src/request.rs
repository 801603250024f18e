// ── Request descriptors ──
//
// Pure translation from a logical cache operation to the method, path,
// query, and body a transport has to execute. Nothing here touches the
// network.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};
use strum::{Display, EnumString};
use url::Url;

use crate::error::Error;

/// Filter set for list reads, kept sorted so query strings and cache
/// keys are canonical.
pub type Filters = BTreeMap<String, Value>;

/// HTTP method of a transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// A fully-built transport call: method, path segments, query, and body.
///
/// Paths are held as raw segments and only percent-encoded when resolved
/// against a base URL, so ids containing `/` or spaces stay a single
/// segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestDescriptor {
    pub method: Method,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestDescriptor {
    fn new(method: Method, segments: Vec<String>) -> Self {
        Self {
            method,
            segments,
            query: Vec::new(),
            body: None,
        }
    }

    fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    // ── Builders ─────────────────────────────────────────────────────

    /// `GET /{entity}?page={p}&limit={n}[&...filters]`
    ///
    /// Filters are appended only when the set is non-empty; `null`
    /// values are skipped and arrays are comma-joined.
    pub fn list(entity: &str, page: u32, limit: u32, filters: &Filters) -> Self {
        let mut req = Self::new(Method::Get, vec![entity.to_owned()]);
        req.query.push(("page".into(), page.to_string()));
        req.query.push(("limit".into(), limit.to_string()));
        for (key, value) in filters {
            if let Some(text) = filter_value(value) {
                req.query.push((key.clone(), text));
            }
        }
        req
    }

    /// `GET /{entity}/{id}`
    pub fn item(entity: &str, id: &str) -> Self {
        Self::new(Method::Get, vec![entity.to_owned(), id.to_owned()])
    }

    /// `POST /{submission_endpoint or entity}` with the payload as body.
    pub fn create(entity: &str, payload: Value, submission_endpoint: Option<&str>) -> Self {
        let segments = resource_segments(submission_endpoint.unwrap_or(entity));
        Self::new(Method::Post, segments).with_body(payload)
    }

    /// `PUT` (full) or `PATCH` (partial) `/{submission_endpoint or entity}/{id}`.
    pub fn update(
        entity: &str,
        id: &str,
        payload: Value,
        partial: bool,
        submission_endpoint: Option<&str>,
    ) -> Self {
        let method = if partial { Method::Patch } else { Method::Put };
        let mut segments = resource_segments(submission_endpoint.unwrap_or(entity));
        segments.push(id.to_owned());
        Self::new(method, segments).with_body(payload)
    }

    /// `DELETE /{entity}/{id}`
    pub fn delete(entity: &str, id: &str) -> Self {
        Self::new(Method::Delete, vec![entity.to_owned(), id.to_owned()])
    }

    /// `PATCH /{entity}/{id}` with body `{ user_id, reactions }`.
    pub fn reaction(entity: &str, id: &str, user_id: &str, reactions: Value) -> Self {
        Self::new(Method::Patch, vec![entity.to_owned(), id.to_owned()])
            .with_body(json!({ "user_id": user_id, "reactions": reactions }))
    }

    // ── Resolution ───────────────────────────────────────────────────

    /// Resolve against a base URL, percent-encoding each path segment.
    ///
    /// The base URL's own path is kept as a prefix (`https://host/api/v1`
    /// + `["product", "7"]` → `https://host/api/v1/product/7`).
    pub fn resolve(&self, base: &Url) -> Result<Url, Error> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(&self.segments);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }

    /// The unencoded `/a/b` path, for logs and diagnostics.
    pub fn path(&self) -> String {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            path.push_str(segment);
        }
        path
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path())?;
        for (i, (key, value)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}

/// Submission endpoints may span several segments (`product/submit`).
fn resource_segments(resource: &str) -> Vec<String> {
    resource
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Render a filter value as query text. `None` means "omit".
fn filter_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(filter_value).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(","))
            }
        }
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn list_without_filters_only_carries_paging() {
        let req = RequestDescriptor::list("product", 2, 25, &Filters::new());
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.to_string(), "GET /product?page=2&limit=25");
        assert!(req.body.is_none());
    }

    #[test]
    fn list_appends_filters_in_key_order() {
        let mut filters = Filters::new();
        filters.insert("status".into(), json!("open"));
        filters.insert("featured".into(), json!(true));
        filters.insert("ignored".into(), Value::Null);
        filters.insert("tags".into(), json!(["rust", "cache"]));

        let req = RequestDescriptor::list("opportunity", 1, 10, &filters);
        assert_eq!(
            req.to_string(),
            "GET /opportunity?page=1&limit=10&featured=true&status=open&tags=rust,cache"
        );
    }

    #[test]
    fn item_and_delete_paths() {
        assert_eq!(
            RequestDescriptor::item("product", "42").to_string(),
            "GET /product/42"
        );
        assert_eq!(
            RequestDescriptor::delete("product", "42").to_string(),
            "DELETE /product/42"
        );
    }

    #[test]
    fn submission_endpoint_overrides_entity_for_writes() {
        let create = RequestDescriptor::create("profile", json!({"a": 1}), Some("users"));
        assert_eq!(create.to_string(), "POST /users");
        assert_eq!(create.body, Some(json!({"a": 1})));

        let put = RequestDescriptor::update("profile", "9", json!({}), false, Some("users"));
        assert_eq!(put.to_string(), "PUT /users/9");

        let patch = RequestDescriptor::update("profile", "9", json!({}), true, None);
        assert_eq!(patch.to_string(), "PATCH /profile/9");

        let nested = RequestDescriptor::create("opportunity", json!({}), Some("/opportunity/apply"));
        assert_eq!(nested.segments, ["opportunity", "apply"]);
    }

    #[test]
    fn reaction_body_shape() {
        let req = RequestDescriptor::reaction("post", "p1", "u7", json!({"views": 6, "likes": 2}));
        assert_eq!(req.method, Method::Patch);
        assert_eq!(req.path(), "/post/p1");
        assert_eq!(
            req.body,
            Some(json!({"user_id": "u7", "reactions": {"views": 6, "likes": 2}}))
        );
    }

    #[test]
    fn resolve_keeps_base_path_and_encodes_segments() {
        let base = Url::parse("https://api.example.com/v1/").unwrap();
        let mut filters = Filters::new();
        filters.insert("q".into(), json!("a b&c"));

        let url = RequestDescriptor::item("product", "a/b c").resolve(&base).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/product/a%2Fb%20c");

        let url = RequestDescriptor::list("product", 1, 5, &filters)
            .resolve(&base)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/product?page=1&limit=5&q=a+b%26c"
        );
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("patch".parse::<Method>().unwrap(), Method::Patch);
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }
}
