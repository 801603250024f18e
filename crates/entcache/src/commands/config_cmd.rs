//! Config subcommand handlers.

use entcache_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, SetProfileArgs};
use crate::config::available_profiles;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => output::print_output(&config::config_path().display().to_string()),

        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            output::emit(global.output, &redacted(cfg))
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            let lines: Vec<String> = cfg
                .profiles
                .keys()
                .map(|name| {
                    if name == default {
                        format!("{name} (default)")
                    } else {
                        name.clone()
                    }
                })
                .collect();
            output::print_output(&lines.join("\n"))
        }

        ConfigCommand::SetProfile(args) => set_profile(args),

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: available_profiles(&cfg),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            let path = config::save_config(&cfg)?;
            eprintln!("Default profile set to '{name}' in {}", path.display());
            Ok(())
        }
    }
}

fn set_profile(args: SetProfileArgs) -> Result<(), CliError> {
    if args.url.parse::<url::Url>().is_err() {
        return Err(CliError::Validation {
            field: "url".into(),
            reason: format!("invalid URL: {}", args.url),
        });
    }

    let mut cfg = config::load_config()?;
    // Keep settings the flags don't cover, such as id_fields.
    let mut profile = cfg.profiles.remove(&args.name).unwrap_or_default();
    profile.base_url = args.url;
    if args.token_env.is_some() {
        profile.token_env = args.token_env;
    }
    if args.ca_cert.is_some() {
        profile.ca_cert = args.ca_cert;
    }
    if args.page_limit.is_some() {
        profile.page_limit = args.page_limit;
    }
    if cfg.profiles.is_empty() {
        cfg.default_profile = Some(args.name.clone());
    }
    cfg.profiles.insert(args.name.clone(), profile);

    let path = config::save_config(&cfg)?;
    eprintln!("Profile '{}' saved to {}", args.name, path.display());
    Ok(())
}

/// Replace plaintext tokens before display.
fn redacted(mut cfg: Config) -> Config {
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(REDACTED.into());
        }
    }
    cfg
}
