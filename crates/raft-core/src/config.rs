//! # config
//!
//! why: collect the timing and sizing knobs of the consensus core in one place
//! relations: consumed by node.rs, loaded from json by whoever embeds the core
//! what: RaftConfig with defaults, validation and json loading

use crate::error::{RaftError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for timing and snapshot behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    /// Minimum election timeout in milliseconds
    pub election_timeout_min: u64,
    /// Maximum election timeout in milliseconds
    pub election_timeout_max: u64,
    /// Leader heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
    /// Upper bound on entries carried by one AppendEntries
    pub max_entries_per_append: usize,
    /// Applied entries since the last snapshot that trigger a capture
    pub snapshot_batch_count: u64,
    /// In-memory log payload bytes that trigger a capture (0 disables)
    pub snapshot_data_threshold: u64,
    /// Bytes per InstallSnapshot chunk
    pub snapshot_chunk_size: usize,
    /// Heartbeat rounds a follower may stay silent and still count as reachable
    pub isolation_rounds: u32,
    /// Request a sync barrier for every appended entry
    pub sync_on_persist: bool,
    /// Seed for election jitter; None seeds from the member id
    pub rng_seed: Option<u64>,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: 150,
            election_timeout_max: 300,
            heartbeat_interval: 50,
            max_entries_per_append: 500,
            snapshot_batch_count: 20_000,
            snapshot_data_threshold: 0,
            snapshot_chunk_size: 2 * 1024 * 1024,
            isolation_rounds: 6,
            sync_on_persist: false,
            rng_seed: None,
        }
    }
}

impl RaftConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| RaftError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(RaftError::InvalidConfig {
                reason: reason.to_string(),
            })
        };
        if self.election_timeout_min == 0 || self.election_timeout_min > self.election_timeout_max {
            return invalid("election timeout range is empty");
        }
        if self.heartbeat_interval == 0 || self.heartbeat_interval >= self.election_timeout_min {
            return invalid("heartbeat interval must be shorter than the election timeout");
        }
        if self.snapshot_chunk_size == 0 {
            return invalid("snapshot chunk size must be positive");
        }
        if self.max_entries_per_append == 0 {
            return invalid("max entries per append must be positive");
        }
        if self.isolation_rounds == 0 {
            return invalid("isolation rounds must be positive");
        }
        Ok(())
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }
}
