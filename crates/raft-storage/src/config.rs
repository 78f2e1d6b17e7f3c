//! # config
//!
//! why: describe where and how durable state is kept
//! relations: consumed by RaftStorage::open, the journal and the snapshot store
//! what: StorageConfig, SyncPolicy, CompressionType

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// When the journal forces written entries to stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// fsync after every batch of appends
    Always,
    /// fsync only for `persist_and_sync`
    #[default]
    OnRequest,
    /// never fsync; durability is left to the operating system
    Never,
}

impl SyncPolicy {
    pub fn requires_sync(self, requested: bool) -> bool {
        match self {
            SyncPolicy::Always => true,
            SyncPolicy::OnRequest => requested,
            SyncPolicy::Never => false,
        }
    }
}

/// Encoding of snapshot files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionType {
    None,
    #[default]
    Lz4,
}

impl CompressionType {
    pub fn extension(self) -> &'static str {
        match self {
            CompressionType::None => "plain",
            CompressionType::Lz4 => "lz4",
        }
    }
}

/// Storage settings for one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// directory holding the term record, the journal and snapshots
    pub dir: PathBuf,
    pub sync: SyncPolicy,
    pub snapshot_compression: CompressionType,
    /// journal payloads at least this large are lz4 block compressed (0 disables)
    pub entry_compression_threshold: usize,
    /// number of newest snapshots kept on disk
    pub retained_snapshots: usize,
    /// applied entries between rewrites of the journal's replay bound
    pub apply_to_interval: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("raft-data"),
            sync: SyncPolicy::default(),
            snapshot_compression: CompressionType::default(),
            entry_compression_threshold: 4096,
            retained_snapshots: 2,
            apply_to_interval: 64,
        }
    }
}

impl StorageConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_policy_decides_per_request() {
        assert!(SyncPolicy::Always.requires_sync(false));
        assert!(SyncPolicy::OnRequest.requires_sync(true));
        assert!(!SyncPolicy::OnRequest.requires_sync(false));
        assert!(!SyncPolicy::Never.requires_sync(true));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = StorageConfig::from_json(r#"{"dir": "/tmp/member-1", "sync": "always"}"#).unwrap();
        assert_eq!(config.dir, PathBuf::from("/tmp/member-1"));
        assert_eq!(config.sync, SyncPolicy::Always);
        assert_eq!(config.snapshot_compression, CompressionType::Lz4);
        assert_eq!(config.retained_snapshots, 2);
        assert_eq!(config.apply_to_interval, 64);
    }
}
