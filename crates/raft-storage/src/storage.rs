//! # storage
//!
//! why: one persistence boundary per member, durable in production and ephemeral in tests
//! relations: bundles term.rs, journal.rs and snapshot.rs; raft-member owns one and executes effects against it
//! what: RaftStorage (Disabled | Enabled), Recovered, startup recovery

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::journal::{EntryJournal, EntryStore, MemoryEntryStore, RecoveredJournal};
use crate::snapshot::{self, FileSnapshotStore, MemorySnapshotStore, SnapshotFile, SnapshotStore};
use crate::term::{FileTermInfoStore, MemoryTermInfoStore, TermInfoStore};
use raft_core::{LogIndex, ReplicatedLog, SnapshotMeta, TermInfo};
use std::path::Path;
use tracing::{info, warn};

const JOURNAL_DIR: &str = "journal";
const SNAPSHOT_DIR: &str = "snapshots";

/// State rebuilt from storage at startup
#[derive(Debug, Clone, Default)]
pub struct Recovered {
    pub term_info: TermInfo,
    /// newest readable snapshot, to be restored into the application before replay
    pub snapshot: Option<(SnapshotMeta, Vec<u8>)>,
    /// snapshot boundary plus every journaled entry after it, all durable
    pub log: ReplicatedLog,
    /// entries up to here were applied before the restart and are known committed
    pub apply_to: LogIndex,
}

/// Storage for a member that keeps nothing across restarts
#[derive(Debug, Default)]
pub struct DisabledStorage {
    terms: MemoryTermInfoStore,
    entries: MemoryEntryStore,
    snapshots: MemorySnapshotStore,
}

/// Storage backed by a directory
pub struct EnabledStorage {
    config: StorageConfig,
    terms: FileTermInfoStore,
    entries: EntryJournal,
    snapshots: FileSnapshotStore,
}

impl EnabledStorage {
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }
}

/// Persistence boundary of one member
pub enum RaftStorage {
    Disabled(DisabledStorage),
    Enabled(EnabledStorage),
}

impl RaftStorage {
    /// In-memory storage; recovery always yields an empty member
    pub fn disabled() -> (Self, Recovered) {
        (RaftStorage::Disabled(DisabledStorage::default()), Recovered::default())
    }

    /// Open the storage directory and rebuild the member's durable state
    ///
    /// The newest snapshot that can be read wins; unreadable ones are skipped with a warning.
    /// Recovery refuses to start when the journal does not continue right after that snapshot.
    pub fn open(config: StorageConfig) -> Result<(Self, Recovered)> {
        let terms = FileTermInfoStore::open(&config.dir)?;
        let snapshots = FileSnapshotStore::open(config.dir.join(SNAPSHOT_DIR), config.snapshot_compression)?;
        let (mut entries, journal) = EntryJournal::open(
            config.dir.join(JOURNAL_DIR),
            config.sync,
            config.entry_compression_threshold,
        )?;

        entries.set_apply_interval(config.apply_to_interval);

        let snapshot = newest_readable(&snapshots);
        let recovered = rebuild(terms.current_term(), snapshot, journal)?;
        if entries.last_index().map_or(false, |last| last > recovered.log.last_index()) {
            entries.remove_from(recovered.log.last_index() + 1)?;
            entries.compact_to(recovered.log.last_meta())?;
        }
        info!(
            dir = %config.dir.display(),
            term = recovered.term_info.term,
            snapshot_index = recovered.log.snapshot_index(),
            last_index = recovered.log.last_index(),
            apply_to = recovered.apply_to,
            "recovered storage"
        );

        let storage = RaftStorage::Enabled(EnabledStorage {
            config,
            terms,
            entries,
            snapshots,
        });
        Ok((storage, recovered))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, RaftStorage::Enabled(_))
    }

    pub fn terms(&mut self) -> &mut dyn TermInfoStore {
        match self {
            RaftStorage::Disabled(s) => &mut s.terms,
            RaftStorage::Enabled(s) => &mut s.terms,
        }
    }

    pub fn entries(&mut self) -> &mut dyn EntryStore {
        match self {
            RaftStorage::Disabled(s) => &mut s.entries,
            RaftStorage::Enabled(s) => &mut s.entries,
        }
    }

    pub fn snapshots(&mut self) -> &mut dyn SnapshotStore {
        match self {
            RaftStorage::Disabled(s) => &mut s.snapshots,
            RaftStorage::Enabled(s) => &mut s.snapshots,
        }
    }

    pub fn current_term(&self) -> TermInfo {
        match self {
            RaftStorage::Disabled(s) => s.terms.current_term(),
            RaftStorage::Enabled(s) => s.terms.current_term(),
        }
    }

    pub fn latest_snapshot(&self) -> Option<SnapshotFile> {
        match self {
            RaftStorage::Disabled(s) => s.snapshots.last(),
            RaftStorage::Enabled(s) => s.snapshots.last(),
        }
    }

    fn retained_snapshots(&self) -> usize {
        match self {
            RaftStorage::Disabled(_) => 1,
            RaftStorage::Enabled(s) => s.config.retained_snapshots.max(1),
        }
    }

    /// Store a snapshot durably, then drop the ones retention no longer keeps
    pub fn save_snapshot(&mut self, meta: SnapshotMeta, data: &[u8]) -> Result<SnapshotFile> {
        let saved = self.snapshots().save(meta, data)?;
        let retained = self.retained_snapshots();
        let list = self.snapshots().list();
        if list.len() > retained {
            let oldest_kept = list[list.len() - retained].meta.last_included_index;
            self.snapshots()
                .delete_snapshots(&|m| m.last_included_index < oldest_kept);
        }
        Ok(saved)
    }
}

fn newest_readable(store: &FileSnapshotStore) -> Option<(SnapshotMeta, Vec<u8>)> {
    for candidate in store.list().into_iter().rev() {
        match snapshot::load(&candidate) {
            Ok(data) => return Some((candidate.meta, data)),
            Err(e) => warn!(
                snapshot = %candidate.meta.last_included(),
                error = %e,
                "skipping unreadable snapshot"
            ),
        }
    }
    None
}

fn rebuild(
    term_info: TermInfo,
    snapshot: Option<(SnapshotMeta, Vec<u8>)>,
    journal: RecoveredJournal,
) -> Result<Recovered> {
    let boundary = snapshot.as_ref().map(|(meta, _)| *meta).unwrap_or_default();
    if journal.meta.replay_from > boundary.last_included_index + 1 {
        return Err(StorageError::JournalGap {
            missing: boundary.last_included_index + 1,
        });
    }

    let mut log = match &snapshot {
        Some((meta, _)) => ReplicatedLog::from_snapshot(*meta),
        None => ReplicatedLog::new(),
    };
    // an install that crashed before truncating leaves a suffix the snapshot superseded
    let diverged = boundary.last_included_index > 0
        && journal
            .entries
            .iter()
            .any(|e| e.index == boundary.last_included_index && e.term != boundary.last_included_term);
    if diverged {
        warn!(
            snapshot = %boundary.last_included(),
            "journal disagrees with snapshot at its boundary, dropping journal suffix"
        );
    }
    for entry in journal.entries {
        if diverged || entry.index <= boundary.last_included_index {
            continue;
        }
        let missing = log.last_index() + 1;
        log.append(entry)
            .map_err(|_| StorageError::JournalGap { missing })?;
    }
    log.mark_durable(log.last_index());

    let apply_to = journal
        .meta
        .apply_to
        .max(boundary.last_included_index)
        .min(log.last_index());
    log.set_commit_index(apply_to);

    Ok(Recovered {
        term_info,
        snapshot,
        log,
        apply_to,
    })
}
