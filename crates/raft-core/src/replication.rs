//! # replication
//!
//! why: keep the leader's per-follower bookkeeping and snapshot transfer state out of node.rs
//! relations: owned by node.rs while leading (FollowerProgress) or following (SnapshotAssembly)
//! what: FollowerProgress, InstallableSnapshot, SnapshotTransfer, SnapshotAssembly

use crate::error::{RaftError, Result};
use crate::types::{LogIndex, MemberId, SnapshotMeta};
use std::sync::Arc;

/// What the leader knows about one follower's log
#[derive(Debug, Clone)]
pub struct FollowerProgress {
    pub id: MemberId,
    pub voting: bool,
    /// next index to send
    pub next_index: LogIndex,
    /// highest index known to be durably replicated on the follower
    pub match_index: LogIndex,
    /// snapshot being streamed to the follower, if any
    pub transfer: Option<SnapshotTransfer>,
    /// the follower cannot converge through appends and needs a snapshot
    pub force_snapshot: bool,
    silent_rounds: u32,
}

impl FollowerProgress {
    pub fn new(id: MemberId, voting: bool, next_index: LogIndex) -> Self {
        Self {
            id,
            voting,
            next_index,
            match_index: 0,
            transfer: None,
            force_snapshot: false,
            silent_rounds: 0,
        }
    }

    pub fn record_contact(&mut self) {
        self.silent_rounds = 0;
    }

    /// Called once per heartbeat round
    pub fn tick_silence(&mut self) {
        self.silent_rounds = self.silent_rounds.saturating_add(1);
    }

    pub fn silent_rounds(&self) -> u32 {
        self.silent_rounds
    }

    pub fn is_active(&self, isolation_rounds: u32) -> bool {
        self.silent_rounds <= isolation_rounds
    }

    /// Raise match_index (it never moves backwards) and keep next_index ahead of it
    pub fn set_match(&mut self, index: LogIndex) -> bool {
        let mut updated = false;
        if index > self.match_index {
            self.match_index = index;
            updated = true;
        }
        if self.next_index != self.match_index + 1 {
            self.next_index = self.match_index + 1;
            updated = true;
        }
        updated
    }

    pub fn set_next(&mut self, index: LogIndex) -> bool {
        let index = index.max(self.match_index + 1).max(1);
        if index != self.next_index {
            self.next_index = index;
            true
        } else {
            false
        }
    }

    /// Step back after a rejected append, never past the follower's own last index
    pub fn decr_next(&mut self, follower_last_index: LogIndex) -> bool {
        let candidate = self
            .next_index
            .saturating_sub(1)
            .min(follower_last_index + 1);
        self.set_next(candidate)
    }
}

/// A captured snapshot the leader can stream to followers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallableSnapshot {
    pub meta: SnapshotMeta,
    pub data: Arc<Vec<u8>>,
}

impl InstallableSnapshot {
    pub fn new(meta: SnapshotMeta, data: Vec<u8>) -> Self {
        Self {
            meta,
            data: Arc::new(data),
        }
    }

    pub fn total_chunks(&self, chunk_size: usize) -> u32 {
        let chunks = self.data.len().div_ceil(chunk_size).max(1);
        u32::try_from(chunks).unwrap_or(u32::MAX)
    }

    /// Bytes of the 1-based chunk `chunk_index`
    pub fn chunk(&self, chunk_index: u32, chunk_size: usize) -> &[u8] {
        let start = (chunk_index.saturating_sub(1) as usize).saturating_mul(chunk_size);
        let start = start.min(self.data.len());
        let end = start.saturating_add(chunk_size).min(self.data.len());
        &self.data[start..end]
    }
}

/// Leader-side progress of streaming one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTransfer {
    pub snapshot: InstallableSnapshot,
    pub total_chunks: u32,
    /// chunk currently awaiting acknowledgement (1-based)
    pub chunk_index: u32,
}

impl SnapshotTransfer {
    pub fn new(snapshot: InstallableSnapshot, chunk_size: usize) -> Self {
        let total_chunks = snapshot.total_chunks(chunk_size);
        Self {
            snapshot,
            total_chunks,
            chunk_index: 1,
        }
    }
}

/// Follower-side reassembly of a snapshot arriving in chunks
#[derive(Debug, Clone)]
pub struct SnapshotAssembly {
    pub leader_id: MemberId,
    pub meta: SnapshotMeta,
    total_chunks: u32,
    next_chunk: u32,
    data: Vec<u8>,
}

impl SnapshotAssembly {
    pub fn new(leader_id: MemberId, meta: SnapshotMeta, total_chunks: u32) -> Self {
        Self {
            leader_id,
            meta,
            total_chunks,
            next_chunk: 1,
            data: Vec::new(),
        }
    }

    pub fn is_for(&self, leader_id: MemberId, meta: SnapshotMeta, total_chunks: u32) -> bool {
        self.leader_id == leader_id && self.meta == meta && self.total_chunks == total_chunks
    }

    /// Add the next chunk; returns true once the last chunk has been added
    ///
    /// A resend of the chunk just added is accepted and ignored.
    pub fn add_chunk(&mut self, chunk_index: u32, chunk: &[u8]) -> Result<bool> {
        if chunk_index + 1 == self.next_chunk {
            return Ok(false);
        }
        if chunk_index != self.next_chunk {
            return Err(RaftError::SnapshotAssembly {
                reason: format!("expected chunk {}, got {}", self.next_chunk, chunk_index),
            });
        }
        self.data.extend_from_slice(chunk);
        self.next_chunk += 1;
        Ok(chunk_index == self.total_chunks)
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
