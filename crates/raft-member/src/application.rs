//! # application
//!
//! why: the member replicates opaque commands; what they mean belongs to the embedding application
//! relations: RaftMember applies committed entries, captures and restores snapshots through it
//! what: Application trait

use raft_core::{LogEntry, SnapshotMeta};
use std::fmt;

/// The replicated state machine
pub trait Application {
    type Error: fmt::Display;

    /// Apply one committed entry; entries arrive once each, in index order
    fn apply(&mut self, entry: &LogEntry) -> Result<(), Self::Error>;

    /// Serialize the state as of the last applied entry
    fn capture_snapshot(&mut self) -> Result<Vec<u8>, Self::Error>;

    /// Replace the state with a snapshot covering everything up to `meta`
    fn restore_snapshot(&mut self, meta: SnapshotMeta, data: &[u8]) -> Result<(), Self::Error>;
}
