//! TUF repository metadata worker CLI
//!
//! Entry point for the `repo-worker` command-line tool.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use tuf_repo_worker::config::{env_layer, EffectiveSettings, DEFAULT_CONFIG_FILE};
use tuf_repo_worker::repository::{InitialMetadata, MetadataRepository, TargetEntry};
use tuf_repo_worker::{Clock, FileKeyStore, FileStore, Scheduler, Settings, SystemClock};

#[derive(Parser)]
#[command(name = "repo-worker")]
#[command(about = "Maintain signed TUF repository metadata", version)]
struct Cli {
    /// Path to config file (default: repo-worker.toml if present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Directory holding role metadata (overrides storage.metadata_dir)
    #[arg(long, global = true)]
    metadata_dir: Option<PathBuf>,

    /// Directory holding signing keys (overrides keys.keys_dir)
    #[arg(long, global = true)]
    keys_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and load a fresh version-1 document set
    Init {
        /// Number of bins is 2^bit_length
        #[arg(long, default_value_t = 8)]
        bit_length: u32,

        /// Bin name prefix
        #[arg(long, default_value = "bins")]
        name_prefix: String,

        /// Generate a key for every key role that has none
        #[arg(long)]
        generate_keys: bool,
    },

    /// Load initial role documents from a JSON map of role name to document
    Bootstrap {
        file: PathBuf,
    },

    /// Add targets from a JSON array of {path, info}, then publish
    AddTargets {
        file: PathBuf,

        /// Only update the bins; leave snapshot and timestamp alone
        #[arg(long)]
        no_publish: bool,
    },

    /// Record the current versions of targets roles in snapshot and timestamp
    Publish {
        #[arg(required = true)]
        roles: Vec<String>,
    },

    /// Renew bins near expiry and publish them
    BumpBins,

    /// Renew snapshot (and timestamp) if near expiry
    BumpSnapshot,

    /// Renew timestamp if near expiry
    BumpTimestamp,

    /// Check cross-role invariants of the stored metadata
    Check {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run maintenance periodically until interrupted
    Run {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Generate a signing key for a key role
    Keygen {
        /// Key role: root, timestamp, snapshot, targets, bin or bins
        key_role: String,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let effective = match load_settings(&cli) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };
    let settings = effective.settings.clone();

    match cli.command {
        Commands::Config => run_config(&effective),
        Commands::Keygen { key_role } => run_keygen(&settings, &key_role),
        Commands::Init {
            bit_length,
            name_prefix,
            generate_keys,
        } => run_init(&settings, bit_length, &name_prefix, generate_keys),
        Commands::Bootstrap { file } => run_bootstrap(&settings, &file),
        Commands::AddTargets { file, no_publish } => run_add_targets(&settings, &file, no_publish),
        Commands::Publish { roles } => run_publish(&settings, &roles),
        Commands::BumpBins => {
            let repo = open_repository(&settings);
            finish(repo.bump_bins_roles().map(|r| (r.is_success(), r.to_string())));
        }
        Commands::BumpSnapshot => {
            let repo = open_repository(&settings);
            finish(repo.bump_snapshot().map(|r| (r.is_success(), r.to_string())));
        }
        Commands::BumpTimestamp => {
            let repo = open_repository(&settings);
            finish(repo.bump_timestamp().map(|r| (r.is_success(), r.to_string())));
        }
        Commands::Check { json } => run_check(&settings, json),
        Commands::Run { once } => run_loop(&settings, once),
    }
}

fn init_tracing(log_level: &str) {
    let level: tracing::Level = log_level.parse().unwrap_or(tracing::Level::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

fn load_settings(cli: &Cli) -> Result<EffectiveSettings, Box<dyn std::error::Error>> {
    let config_path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        }
    };

    let env = env_layer(std::env::vars())?;
    let effective = EffectiveSettings::build(config_path.as_deref(), env, Some(cli_overrides(cli)))?;
    Ok(effective)
}

fn cli_overrides(cli: &Cli) -> toml::Table {
    let mut table = toml::Table::new();
    let mut section = |name: &str, key: &str, path: &Path| {
        let mut inner = toml::Table::new();
        inner.insert(key.to_string(), toml::Value::String(path.display().to_string()));
        table.insert(name.to_string(), toml::Value::Table(inner));
    };
    if let Some(dir) = &cli.metadata_dir {
        section("storage", "metadata_dir", dir.as_path());
    }
    if let Some(dir) = &cli.keys_dir {
        section("keys", "keys_dir", dir.as_path());
    }
    table
}

fn open_repository(settings: &Settings) -> MetadataRepository {
    let store = match FileStore::new(&settings.storage.metadata_dir, settings.lock_timeout()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!(
                "Error opening metadata directory {}: {}",
                settings.storage.metadata_dir.display(),
                e
            );
            process::exit(1);
        }
    };
    let keys = FileKeyStore::new(&settings.keys.keys_dir);
    MetadataRepository::new(store, keys, settings.clone())
}

/// Print the summary and exit non-zero on failure
fn finish<E: std::fmt::Display>(result: Result<(bool, String), E>) {
    match result {
        Ok((success, summary)) => {
            println!("{}", summary);
            if !success {
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            process::exit(1);
        }
    };
    match serde_json::from_str(&contents) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error parsing {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn run_config(effective: &EffectiveSettings) {
    match effective.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            process::exit(1);
        }
    }
}

fn run_keygen(settings: &Settings, key_role: &str) {
    let keys = FileKeyStore::new(&settings.keys.keys_dir);
    match keys.generate(key_role) {
        Ok((signer, path)) => {
            println!("{} key {} written to {}", key_role, signer.key_id(), path.display());
        }
        Err(e) => {
            eprintln!("Error generating key: {}", e);
            process::exit(1);
        }
    }
}

fn run_init(settings: &Settings, bit_length: u32, name_prefix: &str, generate_keys: bool) {
    use tuf_repo_worker::KeyStore;

    let keys = FileKeyStore::new(&settings.keys.keys_dir);
    if generate_keys {
        for key_role in ["root", "timestamp", "snapshot", "targets", "bin", "bins"] {
            let existing = match keys.keys_for(key_role) {
                Ok(k) => k,
                Err(e) => {
                    eprintln!("Error reading keys: {}", e);
                    process::exit(1);
                }
            };
            if existing.is_empty() {
                if let Err(e) = keys.generate(key_role) {
                    eprintln!("Error generating {} key: {}", key_role, e);
                    process::exit(1);
                }
            }
        }
    }

    let now = SystemClock.now();
    let initial = match InitialMetadata::generate(&keys, settings, now, bit_length, name_prefix) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error building initial metadata: {}", e);
            process::exit(1);
        }
    };

    let repo = open_repository(settings);
    finish(
        repo.bootstrap(initial.into_documents())
            .map(|r| (true, r.to_string())),
    );
}

fn run_bootstrap(settings: &Settings, file: &Path) {
    let documents: BTreeMap<String, serde_json::Value> = read_json(file);
    let repo = open_repository(settings);
    finish(repo.bootstrap(documents).map(|r| (true, r.to_string())));
}

fn run_add_targets(settings: &Settings, file: &Path, no_publish: bool) {
    let targets: Vec<TargetEntry> = read_json(file);
    let repo = open_repository(settings);

    let ingest = match repo.add_targets(targets) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    println!("{}", ingest);

    if !no_publish && !ingest.updated.is_empty() {
        let changed = ingest.changed_roles();
        match repo.publish_targets_metas(&changed) {
            Ok(publish) => finish::<String>(Ok((ingest.is_success(), publish.to_string()))),
            Err(e) => {
                eprintln!("Error: {}", e);
                if let Some(unpublished) = ingest.unpublished() {
                    eprintln!("{}", unpublished);
                    eprintln!("Record them with: repo-worker publish {}", changed.join(" "));
                }
                process::exit(1);
            }
        }
    } else if !ingest.is_success() {
        process::exit(1);
    }
}

fn run_publish(settings: &Settings, roles: &[String]) {
    let repo = open_repository(settings);
    finish(
        repo.publish_targets_metas(roles)
            .map(|r| (true, r.to_string())),
    );
}

fn run_check(settings: &Settings, json: bool) {
    let repo = open_repository(settings);
    let report = match repo.check_consistency() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error serializing report: {}", e);
                process::exit(1);
            }
        }
    } else {
        println!("{}", report);
    }

    if !report.is_consistent() {
        process::exit(1);
    }
}

fn run_loop(settings: &Settings, once: bool) {
    let repo = open_repository(settings);
    let scheduler = Scheduler::new(settings.schedule_interval());
    if !once {
        if let Err(e) = scheduler.install_handler() {
            eprintln!("Error installing signal handler: {}", e);
            process::exit(1);
        }
    }

    let mut failed = false;
    scheduler.run(&repo, once, |report| {
        println!("{}", report);
        failed = !report.is_success();
    });

    if once && failed {
        process::exit(1);
    }
}
