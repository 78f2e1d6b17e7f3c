//! # error
//!
//! why: name the ways a consensus operation can be refused
//! relations: returned by node.rs (propose), log.rs (append), config.rs (validate)
//! what: RaftError enum and Result alias

use crate::types::{LogIndex, MemberId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RaftError {
    /// client command sent to a member that is not the leader
    #[error("not leader (current leader: {leader:?})")]
    NotLeader { leader: Option<MemberId> },

    /// leader cannot currently reach a majority
    #[error("no quorum (need {needed} reachable voters, have {active})")]
    NoQuorum { needed: usize, active: usize },

    #[error("non-contiguous append: expected index {expected}, got {actual}")]
    NonContiguousAppend { expected: LogIndex, actual: LogIndex },

    #[error("snapshot assembly failed: {reason}")]
    SnapshotAssembly { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

pub type Result<T> = std::result::Result<T, RaftError>;
