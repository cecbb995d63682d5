//! Worker configuration
//!
//! Settings are merged from four layers, later layers winning:
//! 1. Built-in defaults
//! 2. TOML config file (`repo-worker.toml` or `--config`)
//! 3. `REPO_WORKER_*` environment variables
//! 4. CLI flags

mod defaults;
mod effective;
mod env;
mod merge;

pub use defaults::{
    ExpirationSettings, KeySettings, ScheduleSettings, Settings, StorageSettings,
    DEFAULT_CONFIG_FILE,
};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveSettings};
pub use env::{env_layer, ENV_PREFIX};
pub use merge::{merge_layers, merge_tables};
