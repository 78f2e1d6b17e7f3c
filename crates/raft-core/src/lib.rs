//! # raft-core
//!
//! why: implement the core raft consensus algorithm in pure, portable rust
//! relations: used by raft-storage for recovery types, raft-member drives it and executes its effects
//! what: state machine, election logic, log management, message types, index range sets

pub mod config;
pub mod effect;
pub mod error;
pub mod index_set;
pub mod log;
pub mod message;
pub mod node;
pub mod replication;
pub mod types;

pub use config::RaftConfig;
pub use effect::{CaptureReason, Effect, Event, TimerKind};
pub use error::{RaftError, Result};
pub use index_set::{ImmutableIndexSet, IndexRange, MutableIndexSet};
pub use log::{AppendOutcome, LogEntry, ReplicatedLog};
pub use message::{RaftMessage, SNAPSHOT_INSTALLED};
pub use node::{NodeState, NodeStatus, RaftNode};
pub use replication::{FollowerProgress, InstallableSnapshot};
pub use types::{EntryMeta, LogIndex, MemberId, PeerInfo, SnapshotMeta, Term, TermInfo};
