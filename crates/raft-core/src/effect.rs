//! # effect
//!
//! why: keep the consensus core free of i/o by describing side effects as data
//! relations: produced by node.rs, executed in order by raft-member
//! what: Event (inputs), Effect (outputs), TimerKind, CaptureReason

use crate::log::LogEntry;
use crate::message::RaftMessage;
use crate::node::NodeState;
use crate::types::{EntryMeta, LogIndex, MemberId, SnapshotMeta, TermInfo};
use std::time::Duration;

/// The two timers a member runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Election,
    Heartbeat,
}

/// Inputs that drive the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// a scheduled timer fired
    Timeout(TimerKind),
    /// a peer's message arrived
    Message { from: MemberId, message: RaftMessage },
    /// the entry store confirmed persistence up to and including this entry
    EntriesPersisted { up_to: EntryMeta },
}

/// Why the core wants the application state captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureReason {
    /// the in-memory log outgrew its thresholds
    Compaction,
    /// a follower is behind the snapshot boundary
    Install(MemberId),
}

/// Side effects, to be executed in the order they were emitted
///
/// Executors must stop at the first failing durability effect: a later `Send` may rely on the
/// term or entries persisted before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// durably store the term record before anything that follows
    PersistTerm(TermInfo),
    /// append entries to the entry store; completion is reported back as `EntriesPersisted`
    PersistEntries { entries: Vec<LogEntry>, sync: bool },
    /// drop stored entries with `index >= from`
    TruncateFrom(LogIndex),
    /// drop stored entries up to and including this one now that a snapshot covers them
    CompactTo(EntryMeta),
    Send { to: MemberId, message: RaftMessage },
    /// (re)arm a timer, replacing any pending one of the same kind
    ScheduleTimer { timer: TimerKind, after: Duration },
    CancelTimer(TimerKind),
    /// committed entries are waiting for the application
    ApplyCommitted { up_to: LogIndex },
    /// ask the application for its state as of `last_included`
    CaptureSnapshot { reason: CaptureReason, last_included: EntryMeta },
    /// a complete snapshot arrived from the leader: persist it and restore the application
    InstallSnapshot { meta: SnapshotMeta, data: Vec<u8> },
    StateChanged { from: NodeState, to: NodeState },
}

impl Effect {
    pub fn send(to: MemberId, message: RaftMessage) -> Self {
        Effect::Send { to, message }
    }
}
