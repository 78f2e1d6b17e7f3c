//! # term
//!
//! why: a member must never vote twice in one term or move its term backwards across restarts
//! relations: RaftStorage hands it out, raft-member persists every Effect::PersistTerm through it
//! what: TermInfoStore trait, FileTermInfoStore (term.json, atomic rename), MemoryTermInfoStore

use crate::atomic;
use crate::error::{Result, StorageError};
use raft_core::TermInfo;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TERM_FILE: &str = "term.json";

/// Durable record of the current term and the vote cast in it
pub trait TermInfoStore: Send {
    /// `{term: 0, voted_for: None}` for a fresh store
    fn current_term(&self) -> TermInfo;

    /// Update the in-memory record only (recovery replay)
    ///
    /// A lower term is a caller bug; it is logged and ignored.
    fn set_term(&mut self, info: TermInfo);

    /// Update the record and make it durable before returning
    fn store_and_set_term(&mut self, info: TermInfo) -> Result<()>;
}

/// A term may only grow, and a vote once cast stands for the rest of its term
fn check_transition(current: TermInfo, proposed: TermInfo) -> Result<()> {
    if proposed.term < current.term {
        return Err(StorageError::TermRegression {
            current: current.term,
            proposed: proposed.term,
        });
    }
    if proposed.term == current.term {
        if let Some(voted_for) = current.voted_for {
            if proposed.voted_for != Some(voted_for) {
                return Err(StorageError::VoteConflict {
                    term: current.term,
                    voted_for,
                    proposed: proposed.voted_for,
                });
            }
        }
    }
    Ok(())
}

// -- file backed --

/// Keeps the term record in `<dir>/term.json`
pub struct FileTermInfoStore {
    dir: PathBuf,
    current: TermInfo,
    /// what term.json holds; `current` runs ahead of it after `set_term`
    persisted: TermInfo,
}

impl FileTermInfoStore {
    /// Open the store in `dir`, loading the last persisted record if there is one
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let current: TermInfo = atomic::read_json(&dir, TERM_FILE)?.unwrap_or_default();
        debug!(term = current.term, voted_for = ?current.voted_for, "loaded term record");
        Ok(Self {
            dir,
            current,
            persisted: current,
        })
    }
}

impl TermInfoStore for FileTermInfoStore {
    fn current_term(&self) -> TermInfo {
        self.current
    }

    fn set_term(&mut self, info: TermInfo) {
        if info.term < self.current.term {
            warn!(current = self.current.term, proposed = info.term, "ignoring term regression");
            return;
        }
        self.current = info;
    }

    fn store_and_set_term(&mut self, info: TermInfo) -> Result<()> {
        check_transition(self.current, info)?;
        if info != self.persisted {
            atomic::write_json(&self.dir, TERM_FILE, &info)?;
            debug!(%info, "persisted term record");
            self.persisted = info;
        }
        self.current = info;
        Ok(())
    }
}

// -- in memory --

/// Term record that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryTermInfoStore {
    current: TermInfo,
}

impl MemoryTermInfoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TermInfoStore for MemoryTermInfoStore {
    fn current_term(&self) -> TermInfo {
        self.current
    }

    fn set_term(&mut self, info: TermInfo) {
        if info.term < self.current.term {
            warn!(current = self.current.term, proposed = info.term, "ignoring term regression");
            return;
        }
        self.current = info;
    }

    fn store_and_set_term(&mut self, info: TermInfo) -> Result<()> {
        check_transition(self.current, info)?;
        self.current = info;
        Ok(())
    }
}
