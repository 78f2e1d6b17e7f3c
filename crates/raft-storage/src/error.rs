//! # error
//!
//! why: one error type for everything that can go wrong below the durability boundary
//! relations: returned by every store in this crate, wrapped by raft-member's MemberError
//! what: StorageError, Result alias

use raft_core::{LogIndex, MemberId, Term};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("refusing to move term backwards from {current} to {proposed}")]
    TermRegression { current: Term, proposed: Term },

    #[error("already voted for {voted_for} in term {term}, refusing vote {proposed:?}")]
    VoteConflict {
        term: Term,
        voted_for: MemberId,
        proposed: Option<MemberId>,
    },

    #[error("journal is missing entry {missing}")]
    JournalGap { missing: LogIndex },

    #[error("journal writer has shut down")]
    WriterClosed,

    #[error("snapshot not found")]
    SnapshotNotFound,
}

impl StorageError {
    /// Copy of this error for fanning one failure out to several waiters
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            StorageError::Io(e) => StorageError::Io(io::Error::new(e.kind(), e.to_string())),
            StorageError::Corrupt { path, reason } => StorageError::Corrupt {
                path: path.clone(),
                reason: reason.clone(),
            },
            StorageError::TermRegression { current, proposed } => StorageError::TermRegression {
                current: *current,
                proposed: *proposed,
            },
            StorageError::VoteConflict {
                term,
                voted_for,
                proposed,
            } => StorageError::VoteConflict {
                term: *term,
                voted_for: *voted_for,
                proposed: *proposed,
            },
            StorageError::JournalGap { missing } => StorageError::JournalGap { missing: *missing },
            StorageError::SnapshotNotFound => StorageError::SnapshotNotFound,
            StorageError::Serialization(_) | StorageError::WriterClosed => StorageError::WriterClosed,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
