// ── Runtime cache configuration ──
//
// Describes where the API lives and how records are shaped. Carries the
// access token but never touches disk: the CLI (via entcache-config)
// builds a `CacheConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed development servers).
    DangerAcceptInvalid,
}

/// Which list reads get re-tagged as recommendations.
///
/// A list read for `entity` whose filters carry a truthy `trigger_filter`
/// is stored under `"{entity}recommendation"`, and every record is
/// stamped with `filters[profile_filter]` under `profile_field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationRule {
    pub entity: String,
    pub trigger_filter: String,
    pub profile_filter: String,
    pub profile_field: String,
}

impl RecommendationRule {
    /// Collection name recommendation results are stored under.
    pub fn tagged_entity(&self) -> String {
        format!("{}recommendation", self.entity)
    }
}

impl Default for RecommendationRule {
    fn default() -> Self {
        Self {
            entity: "opportunity".into(),
            trigger_filter: "recommendByTags".into(),
            profile_filter: "profileId".into(),
            profile_field: "profile_id".into(),
        }
    }
}

/// Configuration for a single cache instance.
///
/// Built by the CLI, passed to [`Cache`](crate::Cache); core never reads config files.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// API base URL; request paths are resolved beneath it.
    pub base_url: Url,
    /// Opaque bearer token, sent as `Authorization: Bearer <token>`.
    pub access_token: Option<SecretString>,
    pub tls: TlsVerification,
    pub timeout: Duration,
    /// Page size used when a caller does not pass one.
    pub default_page_limit: u32,
    /// Fields checked, in order, for a record's identifier.
    pub id_fields: Vec<String>,
    pub recommendation: RecommendationRule,
}

impl CacheConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            access_token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            default_page_limit: 25,
            id_fields: default_id_fields(),
            recommendation: RecommendationRule::default(),
        }
    }
}

/// `id`, `_id`, `guid`.
pub fn default_id_fields() -> Vec<String> {
    vec!["id".into(), "_id".into(), "guid".into()]
}
