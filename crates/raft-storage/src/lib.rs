//! # raft-storage
//!
//! why: provide durable persistence for raft state using standard rust fs apis
//! relations: rebuilds raft-core's ReplicatedLog at startup, raft-member executes durability effects through it
//! what: TermInfoStore, EntryStore (journal), SnapshotSource/SnapshotStore, RaftStorage facade and recovery

mod atomic;
pub mod config;
pub mod error;
pub mod journal;
pub mod record;
pub mod snapshot;
pub mod storage;
pub mod term;

pub use config::{CompressionType, StorageConfig, SyncPolicy};
pub use error::{Result, StorageError};
pub use journal::{EntryJournal, EntryStore, JournalMeta, MemoryEntryStore, PersistCallback, RecoveredJournal};
pub use snapshot::{
    FileSnapshotStore, MemorySnapshotStore, OpenStream, SnapshotFile, SnapshotSource, SnapshotStore,
};
pub use storage::{DisabledStorage, EnabledStorage, RaftStorage, Recovered};
pub use term::{FileTermInfoStore, MemoryTermInfoStore, TermInfoStore};
