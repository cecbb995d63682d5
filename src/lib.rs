//! TUF repository metadata worker
//!
//! Keeps a TUF repository's metadata signed and fresh: ingests artifacts into
//! succinct hash bins, propagates changed bin versions into snapshot and
//! timestamp, and renews roles before they expire.

pub mod clock;
pub mod config;
pub mod keys;
pub mod repository;
pub mod role;
pub mod scheduler;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EffectiveSettings, Settings};
pub use keys::{FileKeyStore, KeyStore, MemoryKeyStore};
pub use repository::{
    IngestReport, InitialMetadata, MetadataRepository, PublishReport, RepositoryError,
    RepositoryResult, SweepReport, TargetEntry,
};
pub use role::RoleClass;
pub use scheduler::Scheduler;
pub use store::{FileStore, MemoryStore, MetadataStore, StoreError};
