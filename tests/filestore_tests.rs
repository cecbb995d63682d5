//! End-to-end on the filesystem store and key store

mod common;

use std::fs;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tempfile::TempDir;

use repo_metadata::{Metadata, Snapshot, Targets, BIN, BINS, ROOT, SNAPSHOT, TARGETS, TIMESTAMP};
use tuf_repo_worker::repository::{InitialMetadata, RepositoryError};
use tuf_repo_worker::{
    FileKeyStore, FileStore, FixedClock, KeyStore, MetadataRepository, MetadataStore, Settings,
};

use common::{entry, path_in_bin, start};

struct OnDisk {
    dir: TempDir,
    metadata_dir: std::path::PathBuf,
    repo: MetadataRepository,
    clock: FixedClock,
}

fn on_disk(settings: Settings) -> OnDisk {
    let dir = TempDir::new().unwrap();
    let metadata_dir = dir.path().join("metadata");
    let keys = FileKeyStore::new(dir.path().join("keys"));
    for role in [ROOT, TIMESTAMP, SNAPSHOT, TARGETS, BIN, BINS] {
        keys.generate(role).unwrap();
    }

    let store = FileStore::new(&metadata_dir, StdDuration::from_secs(5)).unwrap();
    let initial = InitialMetadata::generate(&keys, &settings, start(), 2, "bins").unwrap();
    let clock = FixedClock::new(start());
    let repo = MetadataRepository::new(store, keys, settings).with_clock(clock.clone());
    repo.bootstrap(initial.into_documents()).unwrap();

    OnDisk {
        dir,
        metadata_dir,
        repo,
        clock,
    }
}

fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn test_bootstrap_writes_consistent_snapshot_layout() {
    let disk = on_disk(Settings::default());
    let names = file_names(&disk.metadata_dir);
    for expected in [
        "1.root.json",
        "1.targets.json",
        "1.bin.json",
        "1.bins-0.json",
        "1.bins-3.json",
        "1.snapshot.json",
        "timestamp.json",
    ] {
        assert!(names.contains(&expected.to_string()), "missing {expected}: {names:?}");
    }
    assert!(!names.iter().any(|n| n.ends_with(".timestamp.json")));
}

#[test]
fn test_ingest_and_publish_on_disk() {
    let disk = on_disk(Settings::default());
    let succinct = disk.repo.succinct_roles().unwrap();
    let path = path_in_bin(&succinct, "bins-2");

    let ingest = disk.repo.add_targets(vec![entry(&path)]).unwrap();
    let publish = disk
        .repo
        .publish_targets_metas(&ingest.changed_roles())
        .unwrap();
    assert_eq!(publish.snapshot, Some(2));
    assert_eq!(publish.timestamp, Some(2));

    let names = file_names(&disk.metadata_dir);
    assert!(names.contains(&"1.bins-2.json".to_string()));
    assert!(names.contains(&"2.bins-2.json".to_string()));
    assert!(names.contains(&"2.snapshot.json".to_string()));
    assert!(!names.contains(&"2.bins-1.json".to_string()));

    // Older versions stay readable for clients that follow snapshot
    let store = FileStore::new(&disk.metadata_dir, StdDuration::from_secs(5)).unwrap();
    let v1: Metadata<Targets> =
        Metadata::from_bytes(&store.load_version("bins-2", 1).unwrap()).unwrap();
    assert!(v1.signed.targets.is_empty());
    let v2: Metadata<Targets> = Metadata::from_bytes(&store.load("bins-2").unwrap()).unwrap();
    assert!(v2.signed.targets.contains_key(&path));

    let snapshot: Metadata<Snapshot> =
        Metadata::from_bytes(&store.load(SNAPSHOT).unwrap()).unwrap();
    assert_eq!(snapshot.signed.version_of("bins-2"), Some(2));

    assert!(disk.repo.check_consistency().unwrap().is_consistent());
}

#[test]
fn test_second_bootstrap_is_refused() {
    let disk = on_disk(Settings::default());
    let keys = FileKeyStore::new(disk.dir.path().join("keys"));
    let initial =
        InitialMetadata::generate(&keys, &Settings::default(), start(), 2, "bins").unwrap();
    let err = disk.repo.bootstrap(initial.into_documents()).unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidBootstrap(_)));
}

#[test]
fn test_signatures_verify_against_file_keys() {
    let disk = on_disk(Settings {
        enforce_threshold: true,
        ..Settings::default()
    });
    disk.clock
        .set(start() + Duration::days(1) - Duration::minutes(5));

    let report = disk.repo.run_maintenance();
    assert!(report.is_success(), "{report}");

    let keys = FileKeyStore::new(disk.dir.path().join("keys"));
    let bins_key = keys.keys_for(BINS).unwrap()[0].public_key().clone();
    let bin = disk.repo.load::<Targets>("bins-0").unwrap();
    assert_eq!(bin.version(), 2);
    let message = bin.signed_bytes().unwrap();
    assert!(bins_key.verify(&message, &bin.signatures[0].sig).unwrap());
}

#[test]
fn test_stale_writer_rejected_across_store_handles() {
    let disk = on_disk(Settings::default());
    let first = FileStore::new(&disk.metadata_dir, StdDuration::from_secs(5)).unwrap();
    let second = FileStore::new(&disk.metadata_dir, StdDuration::from_secs(5)).unwrap();

    let bytes = first.load("bins-1").unwrap();
    first.persist("bins-1", 2, Some(1), &bytes).unwrap();
    let err = second.persist("bins-1", 2, Some(1), &bytes).unwrap_err();
    assert!(matches!(
        err,
        tuf_repo_worker::StoreError::VersionConflict { .. }
    ));
}
