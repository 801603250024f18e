//! Shared configuration for entcache.
//!
//! TOML profiles, environment overrides, token resolution (env var +
//! plaintext), and translation to `entcache_core::CacheConfig`. The CLI
//! layers its global flags on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use entcache_core::config::default_id_fields;
use entcache_core::{CacheConfig, RecommendationRule, TlsVerification};

/// Environment variable that points at an alternate config file.
pub const CONFIG_PATH_ENV: &str = "ENTCACHE_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no token available for profile '{profile}' (${env} is unset)")]
    NoCredentials { profile: String, env: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named API profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile, falling back to `default_profile` when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, p)| (k.as_str(), p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            insecure: false,
            timeout: default_timeout(),
            page_limit: default_page_limit(),
        }
    }
}

fn default_output() -> String {
    "json".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_page_limit() -> u32 {
    25
}

/// A named API profile.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Profile {
    /// API base URL (e.g., "https://api.example.com/v1").
    pub base_url: String,

    /// Bearer token (plaintext, prefer `token_env`).
    pub token: Option<String>,

    /// Environment variable name containing the bearer token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Override default page size.
    pub page_limit: Option<u32>,

    /// Fields checked for a record's id, in order.
    pub id_fields: Option<Vec<String>>,

    /// Recommendation re-tagging rule.
    #[serde(default)]
    pub recommendation: Recommendation,
}

/// TOML form of [`RecommendationRule`]; every field falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Recommendation {
    pub entity: Option<String>,
    pub trigger_filter: Option<String>,
    pub profile_filter: Option<String>,
    pub profile_field: Option<String>,
}

impl Recommendation {
    pub fn to_rule(&self) -> RecommendationRule {
        let defaults = RecommendationRule::default();
        RecommendationRule {
            entity: self.entity.clone().unwrap_or(defaults.entity),
            trigger_filter: self.trigger_filter.clone().unwrap_or(defaults.trigger_filter),
            profile_filter: self.profile_filter.clone().unwrap_or(defaults.profile_filter),
            profile_field: self.profile_field.clone().unwrap_or(defaults.profile_field),
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `$ENTCACHE_CONFIG`, else platform conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("dev", "entcache", "entcache").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("entcache");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from a specific file, then apply `ENTCACHE_`-prefixed env overrides.
///
/// Nested keys are separated by `__`:
/// `ENTCACHE_PROFILES__LOCAL__BASE_URL=http://localhost:3000`.
/// A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ENTCACHE_").ignore(&["config"]).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bearer token for a profile.
///
/// Order: the variable named by `token_env`, then the plaintext `token`.
/// `Ok(None)` means the profile is anonymous. Naming a `token_env` that
/// is unset, with no plaintext fallback, is an error.
pub fn resolve_token(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<SecretString>, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(Some(SecretString::from(val)));
        }
    }

    // 2. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(Some(SecretString::from(token.clone())));
    }

    match &profile.token_env {
        Some(env) => Err(ConfigError::NoCredentials {
            profile: profile_name.into(),
            env: env.clone(),
        }),
        None => Ok(None),
    }
}

// ── Profile → CacheConfig ───────────────────────────────────────────

/// Build a `CacheConfig` from a profile and the global defaults.
pub fn profile_to_cache_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<CacheConfig, ConfigError> {
    let base_url: url::Url = profile
        .base_url
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "base_url".into(),
            reason: format!("invalid URL: {}", profile.base_url),
        })?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let default_page_limit = profile.page_limit.unwrap_or(defaults.page_limit);
    if default_page_limit == 0 {
        return Err(ConfigError::Validation {
            field: "page_limit".into(),
            reason: "must be at least 1".into(),
        });
    }

    let id_fields = match &profile.id_fields {
        Some(fields) if fields.is_empty() => {
            return Err(ConfigError::Validation {
                field: "id_fields".into(),
                reason: "must name at least one field".into(),
            });
        }
        Some(fields) => fields.clone(),
        None => default_id_fields(),
    };

    Ok(CacheConfig {
        base_url,
        access_token: resolve_token(profile, profile_name)?,
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        default_page_limit,
        id_fields,
        recommendation: profile.recommendation.to_rule(),
    })
}
