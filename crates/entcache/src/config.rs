//! Flag-aware translation of config profiles into `CacheConfig`.
//!
//! Precedence, highest first: command-line flags (and their `ENTCACHE_*`
//! env vars), the selected profile, the file's `[defaults]`.

use std::time::Duration;

use secrecy::SecretString;

use entcache_config::{self as config, Config, ConfigError, Profile};
use entcache_core::{CacheConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Load the config file and build a `CacheConfig` for this invocation.
pub fn build_cache_config(global: &GlobalOpts) -> Result<CacheConfig, CliError> {
    let cfg = config::load_config()?;
    resolve_cache_config(&cfg, global)
}

pub fn resolve_cache_config(cfg: &Config, global: &GlobalOpts) -> Result<CacheConfig, CliError> {
    let mut cache_config = match selected_profile(cfg, global)? {
        Some((name, mut profile)) => {
            if let Some(ref url) = global.base_url {
                profile.base_url.clone_from(url);
            }
            // A token flag makes the profile's token source irrelevant.
            if global.token.is_some() {
                profile.token_env = None;
            }
            config::profile_to_cache_config(&profile, &name, &cfg.defaults)?
        }
        None => {
            let url_str = global.base_url.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config::config_path().display().to_string(),
            })?;
            let url: url::Url = url_str.parse().map_err(|_| CliError::Validation {
                field: "base-url".into(),
                reason: format!("invalid URL: {url_str}"),
            })?;
            let mut cache_config = CacheConfig::new(url);
            cache_config.timeout = Duration::from_secs(cfg.defaults.timeout);
            cache_config.default_page_limit = cfg.defaults.page_limit;
            if cfg.defaults.insecure {
                cache_config.tls = TlsVerification::DangerAcceptInvalid;
            }
            cache_config
        }
    };

    if let Some(ref token) = global.token {
        cache_config.access_token = Some(SecretString::from(token.clone()));
    }
    if let Some(secs) = global.timeout {
        cache_config.timeout = Duration::from_secs(secs);
    }
    if global.insecure {
        cache_config.tls = TlsVerification::DangerAcceptInvalid;
    }
    Ok(cache_config)
}

/// The profile this invocation runs against, if any.
///
/// An explicitly named profile must exist. Without one, the file's
/// default profile is used when present; otherwise flags alone apply.
fn selected_profile(
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<Option<(String, Profile)>, CliError> {
    match cfg.profile(global.profile.as_deref()) {
        Ok((name, profile)) => Ok(Some((name.to_owned(), profile.clone()))),
        Err(ConfigError::UnknownProfile { name }) if global.profile.is_some() => {
            Err(CliError::ProfileNotFound {
                name,
                available: available_profiles(cfg),
            })
        }
        Err(ConfigError::UnknownProfile { .. }) => Ok(None),
        Err(other) => Err(other.into()),
    }
}

pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use secrecy::ExposeSecret;

    fn global() -> GlobalOpts {
        GlobalOpts {
            profile: None,
            base_url: None,
            token: None,
            output: OutputFormat::Json,
            verbose: 0,
            insecure: false,
            timeout: None,
        }
    }

    fn config_with(name: &str, profile: Profile) -> Config {
        let mut cfg = Config {
            default_profile: Some(name.into()),
            ..Config::default()
        };
        cfg.profiles.insert(name.into(), profile);
        cfg
    }

    #[test]
    fn flags_alone_are_enough() {
        let mut opts = global();
        opts.base_url = Some("http://localhost:3000/api".into());
        opts.token = Some("t".into());

        let resolved = resolve_cache_config(&Config::default(), &opts).unwrap();
        assert_eq!(resolved.base_url.as_str(), "http://localhost:3000/api");
        assert_eq!(resolved.access_token.unwrap().expose_secret(), "t");
        assert_eq!(resolved.default_page_limit, 25);
    }

    #[test]
    fn no_profile_and_no_url_is_reported() {
        let err = resolve_cache_config(&Config::default(), &global()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));
    }

    #[test]
    fn named_profile_must_exist() {
        let mut opts = global();
        opts.profile = Some("staging".into());
        let cfg = config_with(
            "prod",
            Profile {
                base_url: "https://api.example.com".into(),
                ..Profile::default()
            },
        );

        let err = resolve_cache_config(&cfg, &opts).unwrap_err();
        assert!(matches!(
            err,
            CliError::ProfileNotFound { ref available, .. } if available == "prod"
        ));
    }

    #[test]
    fn flags_override_profile() {
        let cfg = config_with(
            "prod",
            Profile {
                base_url: "https://api.example.com".into(),
                token_env: Some("ENTCACHE_TEST_UNSET_TOKEN_VAR".into()),
                timeout: Some(5),
                page_limit: Some(10),
                ..Profile::default()
            },
        );
        let mut opts = global();
        opts.token = Some("flag-token".into());
        opts.timeout = Some(90);
        opts.insecure = true;

        let resolved = resolve_cache_config(&cfg, &opts).unwrap();
        assert_eq!(resolved.base_url.as_str(), "https://api.example.com/");
        assert_eq!(resolved.access_token.unwrap().expose_secret(), "flag-token");
        assert_eq!(resolved.timeout, Duration::from_secs(90));
        assert_eq!(resolved.default_page_limit, 10);
        assert_eq!(resolved.tls, TlsVerification::DangerAcceptInvalid);
    }
}
