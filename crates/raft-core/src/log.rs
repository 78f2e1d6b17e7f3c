//! # log
//!
//! why: manage the append-only log of commands that raft replicates
//! relations: owned by node.rs, rebuilt by raft-storage on recovery, persisted through its EntryStore
//! what: LogEntry, ReplicatedLog (snapshot boundary, commit/apply/durable cursors), conflict resolution

use crate::error::{RaftError, Result};
use crate::types::{EntryMeta, LogIndex, SnapshotMeta, Term};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, error, trace};

/// A single entry in the replicated log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term when this entry was created
    pub term: Term,
    /// The index of this entry in the log (1-indexed)
    pub index: LogIndex,
    /// The command to be applied to the state machine
    pub command: Vec<u8>,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(term: Term, index: LogIndex, command: Vec<u8>) -> Self {
        Self {
            term,
            index,
            command,
        }
    }

    pub fn meta(&self) -> EntryMeta {
        EntryMeta::new(self.index, self.term)
    }

    /// Payload size, used for snapshot thresholds
    pub fn size(&self) -> u64 {
        self.command.len() as u64
    }
}

/// Result of offering a leader's entries to the local log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// the entry at `prev_log_index` is missing or carries another term
    Mismatch,
    /// the leader's log disagrees with an entry this log already committed
    CommittedConflict,
    Accepted {
        /// first index of a discarded divergent suffix
        truncated_from: Option<LogIndex>,
        /// entries that are new to this log and still need persisting
        appended: Vec<LogEntry>,
        /// index of the last entry covered by the request
        last_new_index: LogIndex,
    },
}

/// In-memory view of the log: the snapshot boundary plus every entry after it
///
/// Invariants: `last_applied <= commit_index <= last_index()`, entries are contiguous starting at
/// `snapshot_index + 1`, `durable_index <= last_index()`.
#[derive(Debug, Clone, Default)]
pub struct ReplicatedLog {
    entries: VecDeque<LogEntry>,
    snapshot_index: LogIndex,
    snapshot_term: Term,
    commit_index: LogIndex,
    last_applied: LogIndex,
    durable_index: LogIndex,
    data_size: u64,
}

impl ReplicatedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log whose prefix up to `meta` lives in a snapshot that is already applied
    pub fn from_snapshot(meta: SnapshotMeta) -> Self {
        Self {
            snapshot_index: meta.last_included_index,
            snapshot_term: meta.last_included_term,
            commit_index: meta.last_included_index,
            last_applied: meta.last_included_index,
            durable_index: meta.last_included_index,
            ..Self::default()
        }
    }

    // -- accessors --

    pub fn snapshot_index(&self) -> LogIndex {
        self.snapshot_index
    }

    pub fn snapshot_term(&self) -> Term {
        self.snapshot_term
    }

    pub fn snapshot_meta(&self) -> SnapshotMeta {
        SnapshotMeta::new(self.snapshot_index, self.snapshot_term)
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    /// Highest index whose persistence has been confirmed
    pub fn durable_index(&self) -> LogIndex {
        self.durable_index
    }

    /// Payload bytes held in memory
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Number of entries held in memory
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_index(&self) -> LogIndex {
        self.entries
            .back()
            .map_or(self.snapshot_index, |entry| entry.index)
    }

    pub fn last_term(&self) -> Term {
        self.entries
            .back()
            .map_or(self.snapshot_term, |entry| entry.term)
    }

    pub fn last_meta(&self) -> EntryMeta {
        EntryMeta::new(self.last_index(), self.last_term())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Entry at `index`, None if compacted away or not yet appended
    pub fn get(&self, index: LogIndex) -> Option<&LogEntry> {
        if index <= self.snapshot_index {
            return None;
        }
        let offset = usize::try_from(index - self.snapshot_index - 1).ok()?;
        self.entries.get(offset)
    }

    /// Term at `index`, answering from the snapshot boundary when it falls there
    pub fn term_at(&self, index: LogIndex) -> Option<Term> {
        if index == self.snapshot_index {
            return Some(self.snapshot_term);
        }
        self.get(index).map(|entry| entry.term)
    }

    pub fn matches(&self, index: LogIndex, term: Term) -> bool {
        self.term_at(index) == Some(term)
    }

    /// Up to `max` entries starting at `from`, cloned for sending
    pub fn entries_from(&self, from: LogIndex, max: usize) -> Vec<LogEntry> {
        let from = from.max(self.snapshot_index + 1);
        let Ok(offset) = usize::try_from(from - self.snapshot_index - 1) else {
            return Vec::new();
        };
        self.entries.iter().skip(offset).take(max).cloned().collect()
    }

    // -- mutation --

    /// Leader path: the entry must extend the log by exactly one index
    pub fn append(&mut self, entry: LogEntry) -> Result<()> {
        let expected = self.last_index() + 1;
        if entry.index != expected {
            return Err(RaftError::NonContiguousAppend {
                expected,
                actual: entry.index,
            });
        }
        self.data_size += entry.size();
        self.entries.push_back(entry);
        Ok(())
    }

    /// Follower path: check the previous entry, drop a conflicting suffix, append what is new
    pub fn append_from_leader(
        &mut self,
        prev_log_index: LogIndex,
        prev_log_term: Term,
        entries: Vec<LogEntry>,
    ) -> AppendOutcome {
        if prev_log_index > self.last_index() {
            trace!(prev_log_index, last_index = self.last_index(), "previous entry not present");
            return AppendOutcome::Mismatch;
        }
        // anything at or below the snapshot boundary is committed and therefore matches
        if prev_log_index >= self.snapshot_index && !self.matches(prev_log_index, prev_log_term) {
            trace!(prev_log_index, prev_log_term, local = ?self.term_at(prev_log_index), "previous term mismatch");
            if prev_log_index <= self.commit_index {
                return AppendOutcome::CommittedConflict;
            }
            return AppendOutcome::Mismatch;
        }

        let last_new_index = prev_log_index + entries.len() as u64;
        let mut truncated_from = None;
        let mut appended = Vec::new();

        for (offset, entry) in entries.into_iter().enumerate() {
            let expected = prev_log_index + 1 + offset as u64;
            if entry.index != expected {
                error!(expected, actual = entry.index, "leader sent non-contiguous entries");
                return AppendOutcome::Mismatch;
            }
            if entry.index <= self.snapshot_index {
                continue;
            }
            if appended.is_empty() {
                match self.term_at(entry.index) {
                    Some(term) if term == entry.term => continue,
                    Some(term) => {
                        if entry.index <= self.commit_index {
                            error!(index = entry.index, local_term = term, leader_term = entry.term,
                                commit_index = self.commit_index, "leader conflicts with a committed entry");
                            return AppendOutcome::CommittedConflict;
                        }
                        debug!(index = entry.index, local_term = term, leader_term = entry.term,
                            "removing conflicting suffix");
                        self.remove_from(entry.index);
                        truncated_from = Some(entry.index);
                    }
                    None => {}
                }
            }
            self.data_size += entry.size();
            self.entries.push_back(entry.clone());
            appended.push(entry);
        }

        AppendOutcome::Accepted {
            truncated_from,
            appended,
            last_new_index,
        }
    }

    /// Drop every entry with `index >= from` (suffix truncation on conflict)
    pub fn remove_from(&mut self, from: LogIndex) -> usize {
        let keep = from.saturating_sub(self.snapshot_index + 1);
        let Ok(keep) = usize::try_from(keep) else {
            return 0;
        };
        if keep >= self.entries.len() {
            return 0;
        }
        let removed: Vec<LogEntry> = self.entries.drain(keep..).collect();
        self.data_size -= removed.iter().map(LogEntry::size).sum::<u64>();

        let last = self.last_index();
        self.durable_index = self.durable_index.min(last);
        self.commit_index = self.commit_index.min(last);
        self.last_applied = self.last_applied.min(last);
        removed.len()
    }

    /// Drop every entry with `index <= meta.index` and move the snapshot boundary there
    /// (prefix trim after a snapshot became durable)
    pub fn compact_to(&mut self, meta: EntryMeta) -> usize {
        if meta.index <= self.snapshot_index {
            return 0;
        }
        let mut removed = 0;
        while let Some(front) = self.entries.front() {
            if front.index > meta.index {
                break;
            }
            self.data_size -= front.size();
            self.entries.pop_front();
            removed += 1;
        }
        self.snapshot_index = meta.index;
        self.snapshot_term = meta.term;
        self.commit_index = self.commit_index.max(meta.index);
        self.last_applied = self.last_applied.max(meta.index);
        self.durable_index = self.durable_index.max(meta.index);
        removed
    }

    /// Adopt a snapshot received from a leader, keeping any suffix that still matches it
    pub fn reset_to_snapshot(&mut self, meta: SnapshotMeta) {
        let boundary = meta.last_included();
        if self.matches(boundary.index, boundary.term) && boundary.index > self.snapshot_index {
            self.compact_to(boundary);
        } else {
            self.entries.clear();
            self.data_size = 0;
            self.snapshot_index = boundary.index;
            self.snapshot_term = boundary.term;
            self.commit_index = boundary.index;
            self.durable_index = boundary.index;
        }
        self.commit_index = self.commit_index.max(boundary.index);
        self.last_applied = boundary.index;
    }

    /// Raise the commit index, never past the last entry; returns true if it moved
    pub fn set_commit_index(&mut self, index: LogIndex) -> bool {
        let index = index.min(self.last_index());
        if index > self.commit_index {
            self.commit_index = index;
            true
        } else {
            false
        }
    }

    /// Record that persistence finished for entries up to `index`
    pub fn mark_durable(&mut self, index: LogIndex) -> bool {
        let index = index.min(self.last_index());
        if index > self.durable_index {
            self.durable_index = index;
            true
        } else {
            false
        }
    }

    /// Used by recovery once replay has re-applied entries
    pub fn set_last_applied(&mut self, index: LogIndex) {
        self.last_applied = index.min(self.commit_index);
    }

    /// Hand committed-but-unapplied entries to `apply` in index order
    ///
    /// `last_applied` advances one entry at a time, so a failure leaves it at the last entry that
    /// was applied successfully.
    pub fn apply_committed<F, E>(&mut self, mut apply: F) -> std::result::Result<usize, E>
    where
        F: FnMut(&LogEntry) -> std::result::Result<(), E>,
    {
        let mut applied = 0;
        while self.last_applied < self.commit_index {
            let index = self.last_applied + 1;
            let Some(entry) = self.get(index) else {
                error!(index, snapshot_index = self.snapshot_index, "committed entry missing from log");
                break;
            };
            apply(entry)?;
            self.last_applied = index;
            applied += 1;
        }
        Ok(applied)
    }
}
