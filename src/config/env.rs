//! Environment layer (layer 3)
//!
//! Flat `REPO_WORKER_<NAME>` variables mapped onto settings keys. Expiration
//! intervals follow the `<ROLE>_EXPIRATION` naming, e.g.
//! `REPO_WORKER_BINS_EXPIRATION=7`.

use super::effective::ConfigError;

/// Prefix of recognized environment variables
pub const ENV_PREFIX: &str = "REPO_WORKER_";

#[derive(Clone, Copy)]
enum Kind {
    Integer,
    Boolean,
    Text,
}

/// Variable suffix -> (settings path, value kind)
const ENV_KEYS: &[(&str, &[&str], Kind)] = &[
    ("HOURS_BEFORE_EXPIRE", &["hours_before_expire"], Kind::Integer),
    ("ENFORCE_THRESHOLD", &["enforce_threshold"], Kind::Boolean),
    ("ROOT_EXPIRATION", &["expiration", "root"], Kind::Integer),
    ("TIMESTAMP_EXPIRATION", &["expiration", "timestamp"], Kind::Integer),
    ("SNAPSHOT_EXPIRATION", &["expiration", "snapshot"], Kind::Integer),
    ("TARGETS_EXPIRATION", &["expiration", "targets"], Kind::Integer),
    ("BINS_EXPIRATION", &["expiration", "bins"], Kind::Integer),
    ("METADATA_DIR", &["storage", "metadata_dir"], Kind::Text),
    ("LOCK_TIMEOUT_SECONDS", &["storage", "lock_timeout_seconds"], Kind::Integer),
    ("KEYS_DIR", &["keys", "keys_dir"], Kind::Text),
    ("INTERVAL_SECONDS", &["schedule", "interval_seconds"], Kind::Integer),
];

/// Build the environment layer from `(name, value)` pairs
///
/// Unrecognized `REPO_WORKER_*` names are ignored with a warning; values
/// that do not parse are an error.
pub fn env_layer<I>(vars: I) -> Result<toml::Table, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut layer = toml::Table::new();

    for (name, raw) in vars {
        let Some(suffix) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let Some((_, path, kind)) = ENV_KEYS.iter().find(|(key, _, _)| *key == suffix) else {
            tracing::warn!(variable = %name, "ignoring unrecognized environment variable");
            continue;
        };

        let value = parse_value(&name, raw.trim(), *kind)?;
        insert_path(&mut layer, path, value);
    }

    Ok(layer)
}

fn parse_value(name: &str, raw: &str, kind: Kind) -> Result<toml::Value, ConfigError> {
    match kind {
        Kind::Integer => raw
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", name, e))),
        Kind::Boolean => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Ok(toml::Value::Boolean(false)),
            _ => Err(ConfigError::ParseError(format!(
                "{}: expected a boolean, got {:?}",
                name, raw
            ))),
        },
        Kind::Text => Ok(toml::Value::String(raw.to_string())),
    }
}

fn insert_path(table: &mut toml::Table, path: &[&str], value: toml::Value) {
    match path {
        [] => {}
        [last] => {
            table.insert((*last).to_string(), value);
        }
        [first, rest @ ..] => {
            let entry = table
                .entry((*first).to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if !entry.is_table() {
                *entry = toml::Value::Table(toml::Table::new());
            }
            if let toml::Value::Table(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}
