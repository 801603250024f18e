//! Shared helpers for command handlers.

use std::path::Path;

use serde_json::Value;

use entcache_core::Filters;

use crate::error::CliError;

/// Parse `--data`: inline JSON, or `@path` to read a JSON file.
pub fn read_payload(arg: &str) -> Result<Value, CliError> {
    match arg.strip_prefix('@') {
        Some(path) => read_json_file(Path::new(path)),
        None => serde_json::from_str(arg).map_err(|e| CliError::Validation {
            field: "data".into(),
            reason: format!("invalid JSON: {e}"),
        }),
    }
}

pub fn read_json_file(path: &Path) -> Result<Value, CliError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| CliError::Validation {
        field: "data".into(),
        reason: format!("invalid JSON in {}: {e}", path.display()),
    })
}

/// Parse repeated `--filter key=value` flags.
///
/// Values that parse as JSON keep their type (`true`, `3`, `[1,2]`);
/// anything else is taken as a string.
pub fn parse_filters(raw: &[String]) -> Result<Filters, CliError> {
    let mut filters = Filters::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(CliError::Validation {
                field: "filter".into(),
                reason: format!("expected key=value, got '{entry}'"),
            });
        };
        if key.is_empty() {
            return Err(CliError::Validation {
                field: "filter".into(),
                reason: format!("empty key in '{entry}'"),
            });
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.into()));
        filters.insert(key.into(), value);
    }
    Ok(filters)
}
