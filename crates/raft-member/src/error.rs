//! # error
//!
//! why: one error type for callers of a running member
//! relations: wraps raft-core's RaftError and raft-storage's StorageError
//! what: MemberError, Result alias

use raft_core::RaftError;
use raft_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemberError {
    /// the consensus core refused the request (not leader, no quorum, bad config)
    #[error("raft: {0}")]
    Raft(#[from] RaftError),

    /// a durability operation failed; the member has stopped
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("application failed: {reason}")]
    Application { reason: String },

    #[error("member stopped after a fatal fault")]
    Stopped,
}

impl MemberError {
    pub(crate) fn application(reason: impl std::fmt::Display) -> Self {
        MemberError::Application {
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MemberError>;
