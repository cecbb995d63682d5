//! Bootstrap validation

mod common;

use serde_json::json;

use repo_metadata::{Metadata, Root, SNAPSHOT, TIMESTAMP};
use tuf_repo_worker::repository::{InitialMetadata, RepositoryError};
use tuf_repo_worker::{MemoryStore, MetadataRepository, MetadataStore, Settings};

use common::{generate_keys, initial_documents, start, BIT_LENGTH};

fn empty_repo() -> (MetadataRepository, MemoryStore) {
    let store = MemoryStore::new();
    let repo = MetadataRepository::new(store.clone(), generate_keys(), Settings::default());
    (repo, store)
}

#[test]
fn test_bootstrap_generated_set() {
    let keys = generate_keys();
    let documents = initial_documents(&keys, &Settings::default());
    let (repo, store) = empty_repo();

    let report = repo.bootstrap(documents).unwrap();
    // root, targets, bin, four bins, snapshot, timestamp
    assert_eq!(report.written.len(), 9);
    assert_eq!(report.written.last().unwrap().role, TIMESTAMP);
    assert_eq!(report.written[0].role, "root");

    let root: Metadata<Root> = Metadata::from_bytes(&store.load("root").unwrap()).unwrap();
    for role in ["root", "timestamp", "snapshot", "targets", "bin"] {
        assert_eq!(root.signed.roles[role].keyids.len(), 1, "{role}");
    }
    assert!(repo.check_consistency().unwrap().is_consistent());
}

#[test]
fn test_missing_required_role_rejected() {
    let keys = generate_keys();
    let mut documents = initial_documents(&keys, &Settings::default());
    documents.remove("bin");
    let (repo, store) = empty_repo();

    let err = repo.bootstrap(documents).unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidBootstrap(msg) if msg.contains("bin")));
    assert_eq!(store.total_writes(), 0);
}

#[test]
fn test_timestamp_must_point_at_snapshot() {
    let keys = generate_keys();
    let mut documents = initial_documents(&keys, &Settings::default());
    documents.get_mut(TIMESTAMP).unwrap()["signed"]["meta"]["snapshot.json"]["version"] =
        json!(7);
    let (repo, store) = empty_repo();

    let err = repo.bootstrap(documents).unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidBootstrap(_)));
    assert_eq!(store.total_writes(), 0);
}

#[test]
fn test_snapshot_entries_must_exist() {
    let keys = generate_keys();
    let mut documents = initial_documents(&keys, &Settings::default());
    documents.remove("bins-3");
    let (repo, store) = empty_repo();

    let err = repo.bootstrap(documents).unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidBootstrap(msg) if msg.contains("bins-3")));
    assert_eq!(store.total_writes(), 0);
}

#[test]
fn test_wrong_type_rejected() {
    let keys = generate_keys();
    let mut documents = initial_documents(&keys, &Settings::default());
    let timestamp = documents[TIMESTAMP].clone();
    documents.insert(SNAPSHOT.to_string(), timestamp);
    let (repo, _store) = empty_repo();

    let err = repo.bootstrap(documents).unwrap_err();
    assert!(matches!(err, RepositoryError::Metadata { role, .. } if role == SNAPSHOT));
}

#[test]
fn test_bin_without_delegation_rejected() {
    let keys = generate_keys();
    let mut documents = initial_documents(&keys, &Settings::default());
    documents
        .get_mut("bin")
        .unwrap()["signed"]
        .as_object_mut()
        .unwrap()
        .remove("delegations");
    let (repo, _store) = empty_repo();

    let err = repo.bootstrap(documents).unwrap_err();
    assert!(matches!(err, RepositoryError::MissingDelegation { .. }));
}

#[test]
fn test_generate_rejects_out_of_range_expiry() {
    let keys = generate_keys();
    let mut settings = Settings::default();
    settings.expiration.bins = 100_000_000;

    let err = InitialMetadata::generate(&keys, &settings, start(), BIT_LENGTH, "bins").unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::ExpiryOutOfRange { ref role, days: 100_000_000 } if role == "bins-0"
    ));
}
