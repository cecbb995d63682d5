//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use repo_metadata::{SuccinctRoles, TargetFile, BIN, BINS, ROOT, SNAPSHOT, TARGETS, TIMESTAMP};
use tuf_repo_worker::repository::{InitialMetadata, MetadataRepository, TargetEntry};
use tuf_repo_worker::{FixedClock, MemoryKeyStore, MemoryStore, MetadataStore, Settings};

pub const BIT_LENGTH: u32 = 2;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// One key per key role
pub fn generate_keys() -> MemoryKeyStore {
    let keys = MemoryKeyStore::new();
    for role in [ROOT, TIMESTAMP, SNAPSHOT, TARGETS, BIN, BINS] {
        keys.generate(role).unwrap();
    }
    keys
}

pub fn initial_documents(keys: &MemoryKeyStore, settings: &Settings) -> BTreeMap<String, Value> {
    InitialMetadata::generate(keys, settings, start(), BIT_LENGTH, "bins")
        .unwrap()
        .into_documents()
}

pub struct Harness {
    pub repo: MetadataRepository,
    pub store: MemoryStore,
    pub keys: MemoryKeyStore,
    pub clock: FixedClock,
}

/// Bootstrapped in-memory repository with four bins
pub fn harness() -> Harness {
    harness_with(Settings::default())
}

pub fn harness_with(settings: Settings) -> Harness {
    let store = MemoryStore::new();
    let keys = generate_keys();
    let clock = FixedClock::new(start());
    let documents = initial_documents(&keys, &settings);
    let repo = MetadataRepository::new(store.clone(), keys.clone(), settings)
        .with_clock(clock.clone());
    repo.bootstrap(documents).unwrap();
    Harness {
        repo,
        store,
        keys,
        clock,
    }
}

/// Repository over `store`, bootstrapped through it
pub fn repository_over<S: MetadataStore + 'static>(
    store: S,
    keys: &MemoryKeyStore,
    clock: &FixedClock,
) -> MetadataRepository {
    let settings = Settings::default();
    let documents = initial_documents(keys, &settings);
    let repo =
        MetadataRepository::new(store, keys.clone(), settings).with_clock(clock.clone());
    repo.bootstrap(documents).unwrap();
    repo
}

/// A path the delegation assigns to `bin`
pub fn path_in_bin(succinct: &SuccinctRoles, bin: &str) -> String {
    (0..10_000)
        .map(|i| format!("file-{i}"))
        .find(|path| succinct.role_for_target(path) == bin)
        .unwrap()
}

pub fn entry(path: &str) -> TargetEntry {
    TargetEntry::new(path, TargetFile::from_data(path.as_bytes()))
}

impl Harness {
    pub fn clock_now(&self) -> DateTime<Utc> {
        use tuf_repo_worker::Clock;
        self.clock.now()
    }
}
