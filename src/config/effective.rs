//! Effective settings with provenance
//!
//! Records the merged settings together with every contributing source, so
//! `repo-worker config` can show where each value came from.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::defaults::Settings;
use super::merge::merge_layers;
use crate::role::RoleClass;

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Env,
    Cli,
}

/// A contributing layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged, validated settings plus provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveSettings {
    /// When the settings were computed
    pub created_at: DateTime<Utc>,

    pub settings: Settings,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveSettings {
    /// Merge the layers and validate the result
    ///
    /// Layers that are empty are not recorded as sources.
    pub fn build(
        config_path: Option<&Path>,
        env: toml::Table,
        cli_overrides: Option<toml::Table>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![Settings::defaults_table()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = config_path {
            let (table, digest) = Self::load_toml_file(path)?;
            layers.push(table);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if !env.is_empty() {
            layers.push(env);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Env,
                path: None,
                digest: None,
            });
        }

        if let Some(cli) = cli_overrides.filter(|t| !t.is_empty()) {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let settings: Settings = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;

        Self::validate(&settings)?;

        Ok(Self {
            created_at: Utc::now(),
            settings,
            sources,
        })
    }

    /// Read a TOML file, returning its table and the digest of its bytes
    fn load_toml_file(path: &Path) -> Result<(toml::Table, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("invalid UTF-8: {}", e)))?;
        let table: toml::Table = contents
            .parse()
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((table, digest))
    }

    fn validate(settings: &Settings) -> Result<(), ConfigError> {
        if settings.hours_before_expire <= 0 {
            return Err(ConfigError::ValidationError(
                "hours_before_expire must be positive".to_string(),
            ));
        }
        let window = Duration::try_hours(settings.hours_before_expire).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "hours_before_expire ({}) out of range",
                settings.hours_before_expire
            ))
        })?;

        let now = Utc::now();
        for class in RoleClass::ALL {
            let days = settings.expiration.days(class);
            if days <= 0 {
                return Err(ConfigError::ValidationError(format!(
                    "expiration.{} must be positive",
                    class
                )));
            }
            let interval = settings
                .expiration
                .interval(class)
                .filter(|interval| now.checked_add_signed(*interval).is_some())
                .ok_or_else(|| {
                    ConfigError::ValidationError(format!(
                        "expiration.{} ({} days) out of range",
                        class, days
                    ))
                })?;
            // A renewed role must land outside the window, or every sweep
            // would renew it again
            if interval <= window {
                return Err(ConfigError::ValidationError(format!(
                    "expiration.{} ({} days) must exceed hours_before_expire ({} hours)",
                    class, days, settings.hours_before_expire
                )));
            }
        }

        if settings.storage.lock_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "storage.lock_timeout_seconds must be positive".to_string(),
            ));
        }

        if settings.schedule.interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "schedule.interval_seconds must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
