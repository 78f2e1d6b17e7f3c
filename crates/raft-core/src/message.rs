//! # message
//!
//! why: define all raft rpc message types for member communication
//! relations: produced and consumed by node.rs, carried by the transport the embedder provides
//! what: VoteRequest/Response, AppendEntries/Response, InstallSnapshot/Response

use crate::log::LogEntry;
use crate::types::{LogIndex, MemberId, Term};
use serde::{Deserialize, Serialize};

/// `chunk_index` of the InstallSnapshotResponse a follower sends once the whole snapshot is installed
pub const SNAPSHOT_INSTALLED: u32 = u32::MAX;

/// All possible Raft messages between members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaftMessage {
    /// Request a vote during leader election
    VoteRequest {
        term: Term,
        candidate_id: MemberId,
        last_log_index: LogIndex,
        last_log_term: Term,
    },
    /// Response to a vote request
    VoteResponse {
        term: Term,
        voter_id: MemberId,
        vote_granted: bool,
    },
    /// Replicate log entries (also serves as heartbeat when entries is empty)
    AppendEntries {
        term: Term,
        leader_id: MemberId,
        prev_log_index: LogIndex,
        prev_log_term: Term,
        entries: Vec<LogEntry>,
        leader_commit: LogIndex,
    },
    /// Response to AppendEntries
    ///
    /// On success `last_log_index` is the highest index the follower has durably matched with the
    /// leader; on failure it is the follower's last index, so the leader can find the divergence.
    AppendEntriesResponse {
        term: Term,
        follower_id: MemberId,
        success: bool,
        last_log_index: LogIndex,
        last_log_term: Term,
        force_install_snapshot: bool,
    },
    /// One chunk of a snapshot sent to a follower that is too far behind
    InstallSnapshot {
        term: Term,
        leader_id: MemberId,
        last_included_index: LogIndex,
        last_included_term: Term,
        /// 1-based
        chunk_index: u32,
        total_chunks: u32,
        data: Vec<u8>,
    },
    /// Response to InstallSnapshot
    InstallSnapshotResponse {
        term: Term,
        follower_id: MemberId,
        chunk_index: u32,
        success: bool,
    },
}

impl RaftMessage {
    /// The sender's term, carried by every message
    pub fn term(&self) -> Term {
        match self {
            RaftMessage::VoteRequest { term, .. }
            | RaftMessage::VoteResponse { term, .. }
            | RaftMessage::AppendEntries { term, .. }
            | RaftMessage::AppendEntriesResponse { term, .. }
            | RaftMessage::InstallSnapshot { term, .. }
            | RaftMessage::InstallSnapshotResponse { term, .. } => *term,
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            RaftMessage::VoteRequest { .. } => "VoteRequest",
            RaftMessage::VoteResponse { .. } => "VoteResponse",
            RaftMessage::AppendEntries { .. } => "AppendEntries",
            RaftMessage::AppendEntriesResponse { .. } => "AppendEntriesResponse",
            RaftMessage::InstallSnapshot { .. } => "InstallSnapshot",
            RaftMessage::InstallSnapshotResponse { .. } => "InstallSnapshotResponse",
        }
    }
}
