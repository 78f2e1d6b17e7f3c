//! # node
//!
//! why: define the raft member state machine and its state transitions
//! relations: uses message.rs for rpc types, log.rs for entry management, effect.rs for outputs
//! what: NodeState enum, RaftNode (follower/candidate/leader/isolated leader), NodeStatus

use crate::config::RaftConfig;
use crate::effect::{CaptureReason, Effect, Event, TimerKind};
use crate::error::{RaftError, Result};
use crate::log::{AppendOutcome, LogEntry, ReplicatedLog};
use crate::message::{RaftMessage, SNAPSHOT_INSTALLED};
use crate::replication::{FollowerProgress, InstallableSnapshot, SnapshotAssembly, SnapshotTransfer};
use crate::types::{EntryMeta, LogIndex, MemberId, PeerInfo, SnapshotMeta, Term, TermInfo};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// The states a Raft member can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NodeState {
    /// Passive state - listens for heartbeats, votes when asked
    #[default]
    Follower,
    /// Transitional state - requesting votes to become leader
    Candidate,
    /// Active state - manages log replication, sends heartbeats
    Leader,
    /// Leader that lost contact with a majority; keeps replicating but refuses new commands
    IsolatedLeader,
}

impl NodeState {
    pub fn is_leader(self) -> bool {
        matches!(self, NodeState::Leader | NodeState::IsolatedLeader)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Follower => "Follower",
            NodeState::Candidate => "Candidate",
            NodeState::Leader => "Leader",
            NodeState::IsolatedLeader => "IsolatedLeader",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a member, for observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: MemberId,
    pub state: NodeState,
    pub term: Term,
    pub voted_for: Option<MemberId>,
    pub leader: Option<MemberId>,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
    pub last_index: LogIndex,
    pub snapshot_index: LogIndex,
}

/// An append a follower accepted but cannot acknowledge until it is durable
#[derive(Debug, Clone, Copy)]
struct PendingAck {
    leader_id: MemberId,
    up_to: LogIndex,
}

/// A single Raft member
///
/// The member never performs i/o: every handler returns the [`Effect`]s the embedder must execute,
/// in order. Persistence completions come back in through [`RaftNode::entries_persisted`].
#[derive(Debug)]
pub struct RaftNode {
    /// Unique identifier for this member
    pub id: MemberId,
    /// Current state
    pub state: NodeState,
    pub config: RaftConfig,
    term_info: TermInfo,
    voting: bool,
    peers: BTreeMap<MemberId, PeerInfo>,
    log: ReplicatedLog,
    leader_id: Option<MemberId>,
    votes_received: BTreeSet<MemberId>,
    followers: BTreeMap<MemberId, FollowerProgress>,
    pending_ack: Option<PendingAck>,
    latest_snapshot: Option<InstallableSnapshot>,
    capture_in_flight: bool,
    assembly: Option<SnapshotAssembly>,
    rng: StdRng,
}

impl RaftNode {
    /// Create a new member in Follower state; every id in `cluster_nodes` is a voter
    pub fn new(id: MemberId, cluster_nodes: Vec<MemberId>) -> Self {
        Self::with_config(id, cluster_nodes, RaftConfig::default())
    }

    pub fn with_config(id: MemberId, cluster_nodes: Vec<MemberId>, config: RaftConfig) -> Self {
        let members = cluster_nodes.into_iter().map(PeerInfo::voting).collect();
        Self::with_members(id, members, config)
    }

    /// `members` may include this member's own entry to mark it non-voting
    pub fn with_members(id: MemberId, members: Vec<PeerInfo>, config: RaftConfig) -> Self {
        let voting = members
            .iter()
            .find(|peer| peer.id == id)
            .map_or(true, |peer| peer.voting);
        let peers = members
            .into_iter()
            .filter(|peer| peer.id != id)
            .map(|peer| (peer.id, peer))
            .collect();
        let seed = config.rng_seed.unwrap_or(id);
        Self {
            id,
            state: NodeState::Follower,
            config,
            term_info: TermInfo::default(),
            voting,
            peers,
            log: ReplicatedLog::new(),
            leader_id: None,
            votes_received: BTreeSet::new(),
            followers: BTreeMap::new(),
            pending_ack: None,
            latest_snapshot: None,
            capture_in_flight: false,
            assembly: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Resume from recovered storage
    pub fn with_state(mut self, term_info: TermInfo, log: ReplicatedLog) -> Self {
        self.term_info = term_info;
        self.log = log;
        self
    }

    // -- accessors --

    pub fn current_term(&self) -> Term {
        self.term_info.term
    }

    pub fn voted_for(&self) -> Option<MemberId> {
        self.term_info.voted_for
    }

    pub fn term_info(&self) -> TermInfo {
        self.term_info
    }

    pub fn leader_id(&self) -> Option<MemberId> {
        self.leader_id
    }

    pub fn is_voting(&self) -> bool {
        self.voting
    }

    pub fn log(&self) -> &ReplicatedLog {
        &self.log
    }

    pub fn votes_received(&self) -> &BTreeSet<MemberId> {
        &self.votes_received
    }

    pub fn follower(&self, id: MemberId) -> Option<&FollowerProgress> {
        self.followers.get(&id)
    }

    pub fn last_log_index(&self) -> LogIndex {
        self.log.last_index()
    }

    pub fn last_log_term(&self) -> Term {
        self.log.last_term()
    }

    pub fn commit_index(&self) -> LogIndex {
        self.log.commit_index()
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            id: self.id,
            state: self.state,
            term: self.term_info.term,
            voted_for: self.term_info.voted_for,
            leader: self.leader_id,
            commit_index: self.log.commit_index(),
            last_applied: self.log.last_applied(),
            last_index: self.log.last_index(),
            snapshot_index: self.log.snapshot_index(),
        }
    }

    /// Number of voters required for a majority
    pub fn quorum_size(&self) -> usize {
        self.voter_count() / 2 + 1
    }

    fn voter_count(&self) -> usize {
        let peers = self.peers.values().filter(|peer| peer.voting).count();
        peers + usize::from(self.voting)
    }

    /// Whether the votes collected so far form a majority
    pub fn has_quorum(&self) -> bool {
        self.votes_received.len() >= self.quorum_size()
    }

    // -- entry points --

    /// Arm the election timer of a freshly started member
    pub fn start(&mut self) -> Vec<Effect> {
        if !self.voting {
            return Vec::new();
        }
        vec![self.election_timer()]
    }

    /// Dispatch any input event
    pub fn step(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Timeout(TimerKind::Election) => self.handle_election_timeout(),
            Event::Timeout(TimerKind::Heartbeat) => self.handle_heartbeat_timeout(),
            Event::Message { from, message } => self.handle_message(from, message),
            Event::EntriesPersisted { up_to } => self.entries_persisted(up_to),
        }
    }

    pub fn handle_election_timeout(&mut self) -> Vec<Effect> {
        if self.state.is_leader() || !self.voting {
            return Vec::new();
        }
        info!(member = self.id, term = self.current_term(), state = %self.state,
            "election timeout, starting election");
        self.start_election()
    }

    pub fn handle_heartbeat_timeout(&mut self) -> Vec<Effect> {
        if !self.state.is_leader() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        let peers: Vec<MemberId> = self.followers.keys().copied().collect();
        for peer in peers {
            if let Some(progress) = self.followers.get_mut(&peer) {
                progress.tick_silence();
            }
            effects.extend(self.send_updates(peer));
        }
        effects.extend(self.check_isolation());
        effects.push(Effect::ScheduleTimer {
            timer: TimerKind::Heartbeat,
            after: self.config.heartbeat(),
        });
        effects
    }

    /// Handle a message from a peer
    ///
    /// A message with a higher term is adopted (durably) before anything else happens.
    pub fn handle_message(&mut self, from: MemberId, message: RaftMessage) -> Vec<Effect> {
        trace!(member = self.id, from, kind = message.kind(), term = message.term(), "received message");
        let mut effects = Vec::new();
        if message.term() > self.current_term() {
            info!(member = self.id, from, kind = message.kind(), current = self.current_term(),
                observed = message.term(), "observed higher term");
            effects.extend(self.step_down(message.term()));
        }

        let replies = match message {
            RaftMessage::VoteRequest {
                term,
                candidate_id,
                last_log_index,
                last_log_term,
            } => self.handle_vote_request(term, candidate_id, last_log_index, last_log_term),
            RaftMessage::VoteResponse {
                term,
                voter_id,
                vote_granted,
            } => self.handle_vote_response(term, voter_id, vote_granted),
            RaftMessage::AppendEntries {
                term,
                leader_id,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            } => self.handle_append_entries(term, leader_id, prev_log_index, prev_log_term, entries, leader_commit),
            RaftMessage::AppendEntriesResponse {
                term,
                follower_id,
                success,
                last_log_index,
                last_log_term,
                force_install_snapshot,
            } => self.handle_append_entries_response(
                term,
                follower_id,
                success,
                last_log_index,
                last_log_term,
                force_install_snapshot,
            ),
            RaftMessage::InstallSnapshot {
                term,
                leader_id,
                last_included_index,
                last_included_term,
                chunk_index,
                total_chunks,
                data,
            } => self.handle_install_snapshot(
                term,
                leader_id,
                SnapshotMeta::new(last_included_index, last_included_term),
                chunk_index,
                total_chunks,
                data,
            ),
            RaftMessage::InstallSnapshotResponse {
                term,
                follower_id,
                chunk_index,
                success,
            } => self.handle_install_snapshot_response(term, follower_id, chunk_index, success),
        };
        effects.extend(replies);
        effects
    }

    /// Submit a client command; only a leader in contact with a majority accepts it
    pub fn propose(&mut self, command: Vec<u8>) -> Result<(LogIndex, Vec<Effect>)> {
        match self.state {
            NodeState::Leader => {}
            NodeState::IsolatedLeader => {
                return Err(RaftError::NoQuorum {
                    needed: self.quorum_size(),
                    active: self.active_voters(),
                })
            }
            NodeState::Follower | NodeState::Candidate => {
                return Err(RaftError::NotLeader {
                    leader: self.leader_id,
                })
            }
        }

        let index = self.log.last_index() + 1;
        let entry = LogEntry::new(self.current_term(), index, command);
        self.log.append(entry.clone())?;
        debug!(member = self.id, index, term = entry.term, "appended client command");

        let mut effects = vec![Effect::PersistEntries {
            entries: vec![entry],
            sync: self.config.sync_on_persist,
        }];
        let caught_up: Vec<MemberId> = self
            .followers
            .values()
            .filter(|progress| progress.transfer.is_none() && progress.next_index == index)
            .map(|progress| progress.id)
            .collect();
        for peer in caught_up {
            effects.extend(self.send_updates(peer));
        }
        Ok((index, effects))
    }

    /// The entry store finished persisting everything up to `up_to`
    ///
    /// Ignored when the entry has since been replaced by a conflicting one.
    pub fn entries_persisted(&mut self, up_to: EntryMeta) -> Vec<Effect> {
        if !self.log.matches(up_to.index, up_to.term) {
            trace!(member = self.id, persisted = %up_to, "persisted entry no longer in log");
            return Vec::new();
        }
        if !self.log.mark_durable(up_to.index) {
            return Vec::new();
        }
        trace!(member = self.id, durable = self.log.durable_index(), "entries durable");
        if self.state.is_leader() {
            return self.advance_commit_index();
        }
        match self.pending_ack {
            Some(pending) if self.log.durable_index() >= pending.up_to => {
                self.pending_ack = None;
                vec![Effect::send(pending.leader_id, self.append_success(pending.up_to))]
            }
            _ => Vec::new(),
        }
    }

    /// Hand committed entries to `apply` in order; may request a snapshot afterwards
    pub fn apply_committed<F, E>(&mut self, apply: F) -> std::result::Result<Vec<Effect>, E>
    where
        F: FnMut(&LogEntry) -> std::result::Result<(), E>,
    {
        let applied = self.log.apply_committed(apply)?;
        if applied > 0 {
            trace!(member = self.id, applied, last_applied = self.log.last_applied(), "applied entries");
        }
        Ok(self.check_snapshot_trigger())
    }

    /// A snapshot captured for `meta` is durable; compact the log behind it
    pub fn snapshot_captured(&mut self, meta: SnapshotMeta, data: Vec<u8>) -> Vec<Effect> {
        self.capture_in_flight = false;
        let mut effects = Vec::new();
        if meta.last_included_index > self.log.snapshot_index() {
            let removed = self.log.compact_to(meta.last_included());
            info!(member = self.id, snapshot = %meta.last_included(), removed, "compacted log");
            effects.push(Effect::CompactTo(meta.last_included()));
        }
        self.latest_snapshot = Some(InstallableSnapshot::new(meta, data));

        if self.state.is_leader() {
            let lagging: Vec<MemberId> = self
                .followers
                .values()
                .filter(|p| p.transfer.is_none() && (p.force_snapshot || p.next_index <= self.log.snapshot_index()))
                .map(|p| p.id)
                .collect();
            for peer in lagging {
                effects.extend(self.send_updates(peer));
            }
        }
        effects
    }

    /// Capture failed or was abandoned; allow another attempt later
    pub fn snapshot_capture_failed(&mut self) {
        warn!(member = self.id, "snapshot capture failed");
        self.capture_in_flight = false;
    }

    /// The embedder persisted and restored a snapshot delivered by `InstallSnapshot`
    pub fn snapshot_installed(&mut self, meta: SnapshotMeta) -> Vec<Effect> {
        let mut effects = Vec::new();
        let boundary = meta.last_included();
        if !self.log.matches(boundary.index, boundary.term) {
            effects.push(Effect::TruncateFrom(boundary.index.saturating_add(1)));
        }
        self.log.reset_to_snapshot(meta);
        effects.push(Effect::CompactTo(boundary));
        info!(member = self.id, snapshot = %boundary, "installed snapshot from leader");

        if let Some(leader_id) = self.leader_id {
            effects.push(Effect::send(
                leader_id,
                RaftMessage::InstallSnapshotResponse {
                    term: self.current_term(),
                    follower_id: self.id,
                    chunk_index: SNAPSHOT_INSTALLED,
                    success: true,
                },
            ));
        }
        effects
    }

    // -- elections --

    /// Become a candidate: bump the term, vote for ourselves, ask every voter
    pub fn start_election(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.term_info = TermInfo::new(self.current_term() + 1, Some(self.id));
        effects.push(Effect::PersistTerm(self.term_info));
        effects.extend(self.transition(NodeState::Candidate));
        self.leader_id = None;
        self.votes_received.clear();
        self.votes_received.insert(self.id);
        effects.push(self.election_timer());

        if self.has_quorum() {
            effects.extend(self.become_leader());
            return effects;
        }

        let request = RaftMessage::VoteRequest {
            term: self.current_term(),
            candidate_id: self.id,
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
        };
        for peer in self.peers.values().filter(|peer| peer.voting) {
            effects.push(Effect::send(peer.id, request.clone()));
        }
        effects
    }

    fn handle_vote_request(
        &mut self,
        term: Term,
        candidate_id: MemberId,
        last_log_index: LogIndex,
        last_log_term: Term,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let can_vote = term == self.current_term()
            && self.voting
            && self
                .term_info
                .voted_for
                .map_or(true, |voted| voted == candidate_id);
        let granted = can_vote && self.is_log_up_to_date(last_log_index, last_log_term);

        if granted {
            if self.term_info.voted_for.is_none() {
                self.term_info = TermInfo::new(term, Some(candidate_id));
                effects.push(Effect::PersistTerm(self.term_info));
            }
            effects.push(self.election_timer());
            info!(member = self.id, term, candidate_id, "granted vote");
        } else {
            debug!(member = self.id, term, candidate_id, current = self.current_term(),
                voted_for = ?self.term_info.voted_for, "denied vote");
        }

        effects.push(Effect::send(
            candidate_id,
            RaftMessage::VoteResponse {
                term: self.current_term(),
                voter_id: self.id,
                vote_granted: granted,
            },
        ));
        effects
    }

    fn handle_vote_response(&mut self, term: Term, voter_id: MemberId, vote_granted: bool) -> Vec<Effect> {
        if self.state != NodeState::Candidate || term != self.current_term() {
            trace!(member = self.id, term, voter_id, "ignoring stale vote response");
            return Vec::new();
        }
        let is_voter = self.peers.get(&voter_id).map_or(false, |peer| peer.voting);
        if !vote_granted || !is_voter {
            return Vec::new();
        }
        self.votes_received.insert(voter_id);
        debug!(member = self.id, term, voter_id, votes = self.votes_received.len(),
            needed = self.quorum_size(), "received vote");
        if self.has_quorum() {
            self.become_leader()
        } else {
            Vec::new()
        }
    }

    /// Election restriction: the candidate's log must be at least as up to date as ours
    fn is_log_up_to_date(&self, last_log_index: LogIndex, last_log_term: Term) -> bool {
        let our_term = self.log.last_term();
        last_log_term > our_term || (last_log_term == our_term && last_log_index >= self.log.last_index())
    }

    fn become_leader(&mut self) -> Vec<Effect> {
        let mut effects = self.transition(NodeState::Leader);
        self.leader_id = Some(self.id);
        self.votes_received.clear();
        self.pending_ack = None;
        self.assembly = None;

        let next_index = self.log.last_index() + 1;
        self.followers = self
            .peers
            .values()
            .map(|peer| (peer.id, FollowerProgress::new(peer.id, peer.voting, next_index)))
            .collect();
        info!(member = self.id, term = self.current_term(), last_index = self.log.last_index(),
            "became leader");

        effects.push(Effect::CancelTimer(TimerKind::Election));
        let peers: Vec<MemberId> = self.followers.keys().copied().collect();
        for peer in peers {
            effects.extend(self.send_updates(peer));
        }
        effects.push(Effect::ScheduleTimer {
            timer: TimerKind::Heartbeat,
            after: self.config.heartbeat(),
        });
        effects.extend(self.advance_commit_index());
        effects
    }

    /// Fall back to follower, adopting `term` durably if it is newer than ours
    pub fn step_down(&mut self, term: Term) -> Vec<Effect> {
        let mut effects = Vec::new();
        if term > self.current_term() {
            self.term_info = TermInfo::voteless(term);
            effects.push(Effect::PersistTerm(self.term_info));
            self.leader_id = None;
            self.pending_ack = None;
        }
        if self.state != NodeState::Follower {
            let was_leader = self.state.is_leader();
            effects.extend(self.transition(NodeState::Follower));
            self.votes_received.clear();
            self.followers.clear();
            if was_leader {
                effects.push(Effect::CancelTimer(TimerKind::Heartbeat));
            }
            if self.voting {
                effects.push(self.election_timer());
            }
        }
        effects
    }

    fn transition(&mut self, to: NodeState) -> Vec<Effect> {
        let from = self.state;
        if from == to {
            return Vec::new();
        }
        self.state = to;
        info!(member = self.id, term = self.current_term(), %from, %to, "state transition");
        vec![Effect::StateChanged { from, to }]
    }

    fn election_timer(&mut self) -> Effect {
        let min = self.config.election_timeout_min;
        let max = self.config.election_timeout_max.max(min);
        let after = Duration::from_millis(self.rng.gen_range(min..=max));
        Effect::ScheduleTimer {
            timer: TimerKind::Election,
            after,
        }
    }

    // -- follower side of replication --

    fn handle_append_entries(
        &mut self,
        term: Term,
        leader_id: MemberId,
        prev_log_index: LogIndex,
        prev_log_term: Term,
        entries: Vec<LogEntry>,
        leader_commit: LogIndex,
    ) -> Vec<Effect> {
        if term < self.current_term() {
            debug!(member = self.id, term, leader_id, current = self.current_term(), "rejecting stale append");
            return vec![Effect::send(leader_id, self.append_failure(false))];
        }
        let mut effects = Vec::new();
        if self.state.is_leader() {
            error!(member = self.id, term, leader_id, "another leader in our term, ignoring its append");
            return effects;
        }
        if self.state == NodeState::Candidate {
            effects.extend(self.step_down(term));
        }
        if self.leader_id != Some(leader_id) {
            info!(member = self.id, term, leader_id, "following new leader");
            self.leader_id = Some(leader_id);
        }
        if self.voting {
            effects.push(self.election_timer());
        }

        match self.log.append_from_leader(prev_log_index, prev_log_term, entries) {
            AppendOutcome::Mismatch => {
                debug!(member = self.id, prev_log_index, prev_log_term, last_index = self.log.last_index(),
                    "log mismatch, rejecting append");
                effects.push(Effect::send(leader_id, self.append_failure(false)));
            }
            AppendOutcome::CommittedConflict => {
                warn!(member = self.id, prev_log_index, prev_log_term, commit_index = self.log.commit_index(),
                    "leader log conflicts with committed entries, requesting snapshot");
                effects.push(Effect::send(leader_id, self.append_failure(true)));
            }
            AppendOutcome::Accepted {
                truncated_from,
                appended,
                last_new_index,
            } => {
                if let Some(from) = truncated_from {
                    effects.push(Effect::TruncateFrom(from));
                }
                if !appended.is_empty() {
                    effects.push(Effect::PersistEntries {
                        entries: appended,
                        sync: self.config.sync_on_persist,
                    });
                }
                if self.log.set_commit_index(leader_commit.min(last_new_index)) {
                    effects.push(Effect::ApplyCommitted {
                        up_to: self.log.commit_index(),
                    });
                }
                if self.log.durable_index() >= last_new_index {
                    effects.push(Effect::send(leader_id, self.append_success(last_new_index)));
                } else {
                    self.pending_ack = Some(PendingAck {
                        leader_id,
                        up_to: last_new_index,
                    });
                }
            }
        }
        effects
    }

    fn append_success(&self, matched: LogIndex) -> RaftMessage {
        RaftMessage::AppendEntriesResponse {
            term: self.current_term(),
            follower_id: self.id,
            success: true,
            last_log_index: matched,
            last_log_term: self.log.term_at(matched).unwrap_or(0),
            force_install_snapshot: false,
        }
    }

    fn append_failure(&self, force_install_snapshot: bool) -> RaftMessage {
        RaftMessage::AppendEntriesResponse {
            term: self.current_term(),
            follower_id: self.id,
            success: false,
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
            force_install_snapshot,
        }
    }

    fn handle_install_snapshot(
        &mut self,
        term: Term,
        leader_id: MemberId,
        meta: SnapshotMeta,
        chunk_index: u32,
        total_chunks: u32,
        data: Vec<u8>,
    ) -> Vec<Effect> {
        let reply = |node: &Self, success: bool| {
            Effect::send(
                leader_id,
                RaftMessage::InstallSnapshotResponse {
                    term: node.current_term(),
                    follower_id: node.id,
                    chunk_index,
                    success,
                },
            )
        };
        if term < self.current_term() {
            return vec![reply(self, false)];
        }
        let mut effects = Vec::new();
        if self.state.is_leader() {
            error!(member = self.id, term, leader_id, "another leader in our term, ignoring its snapshot");
            return effects;
        }
        if self.state == NodeState::Candidate {
            effects.extend(self.step_down(term));
        }
        self.leader_id = Some(leader_id);
        if self.voting {
            effects.push(self.election_timer());
        }

        if meta.last_included_index < self.log.snapshot_index() || self.log.snapshot_meta() == meta {
            trace!(member = self.id, snapshot = %meta.last_included(), "snapshot already installed");
            self.assembly = None;
            effects.push(Effect::send(
                leader_id,
                RaftMessage::InstallSnapshotResponse {
                    term: self.current_term(),
                    follower_id: self.id,
                    chunk_index: SNAPSHOT_INSTALLED,
                    success: true,
                },
            ));
            return effects;
        }
        let matching = self
            .assembly
            .as_ref()
            .map_or(false, |a| a.is_for(leader_id, meta, total_chunks));
        if chunk_index == 1 && !matching {
            self.assembly = Some(SnapshotAssembly::new(leader_id, meta, total_chunks));
        }
        let Some(assembly) = self
            .assembly
            .as_mut()
            .filter(|a| a.is_for(leader_id, meta, total_chunks))
        else {
            debug!(member = self.id, chunk_index, "snapshot chunk without a matching transfer");
            effects.push(reply(self, false));
            return effects;
        };

        match assembly.add_chunk(chunk_index, &data) {
            Ok(false) => effects.push(reply(self, true)),
            Ok(true) => {
                let data = self.assembly.take().map(SnapshotAssembly::into_data).unwrap_or_default();
                info!(member = self.id, snapshot = %meta.last_included(), bytes = data.len(),
                    "snapshot received, installing");
                effects.push(Effect::InstallSnapshot { meta, data });
            }
            Err(e) => {
                warn!(member = self.id, error = %e, "dropping snapshot transfer");
                self.assembly = None;
                effects.push(reply(self, false));
            }
        }
        effects
    }

    // -- leader side of replication --

    fn handle_append_entries_response(
        &mut self,
        term: Term,
        follower_id: MemberId,
        success: bool,
        last_log_index: LogIndex,
        last_log_term: Term,
        force_install_snapshot: bool,
    ) -> Vec<Effect> {
        if !self.state.is_leader() || term != self.current_term() {
            return Vec::new();
        }
        let Some(progress) = self.followers.get_mut(&follower_id) else {
            warn!(member = self.id, follower_id, "append response from unknown follower");
            return Vec::new();
        };
        progress.record_contact();

        if success {
            match self.log.term_at(last_log_index) {
                Some(local_term) if local_term != last_log_term => {
                    // follower matched a prefix we no longer hold with that term
                    progress.set_next(last_log_index.saturating_sub(1));
                    info!(member = self.id, follower_id, last_log_index, last_log_term, local_term,
                        next = progress.next_index, "follower holds a conflicting entry");
                }
                None if last_log_index > self.log.last_index() => {
                    warn!(member = self.id, follower_id, last_log_index, last_index = self.log.last_index(),
                        "follower acknowledged entries beyond our log");
                }
                _ => {
                    if progress.set_match(last_log_index) {
                        trace!(member = self.id, follower_id, match_index = progress.match_index,
                            next_index = progress.next_index, "follower progress updated");
                    }
                }
            }
        } else if force_install_snapshot {
            info!(member = self.id, follower_id, "follower requested a snapshot");
            progress.force_snapshot = true;
        } else {
            let behind = last_log_index < progress.next_index.saturating_sub(1)
                && self.log.term_at(last_log_index) == Some(last_log_term);
            if behind {
                progress.set_next(last_log_index + 1);
            } else {
                progress.decr_next(last_log_index);
            }
            debug!(member = self.id, follower_id, last_log_index, last_log_term,
                next = progress.next_index, "append rejected, retrying from earlier index");
        }

        let mut effects = self.advance_commit_index();
        effects.extend(self.check_isolation());
        let needs_more = self.followers.get(&follower_id).map_or(false, |p| {
            p.transfer.is_none() && (!success || p.next_index <= self.log.last_index())
        });
        if needs_more {
            effects.extend(self.send_updates(follower_id));
        }
        effects
    }

    fn handle_install_snapshot_response(
        &mut self,
        term: Term,
        follower_id: MemberId,
        chunk_index: u32,
        success: bool,
    ) -> Vec<Effect> {
        if !self.state.is_leader() || term != self.current_term() {
            return Vec::new();
        }
        let Some(progress) = self.followers.get_mut(&follower_id) else {
            return Vec::new();
        };
        progress.record_contact();
        let Some(transfer) = progress.transfer.as_mut() else {
            return Vec::new();
        };

        let done = chunk_index == SNAPSHOT_INSTALLED;
        if !success {
            debug!(member = self.id, follower_id, chunk_index, "snapshot chunk rejected, restarting transfer");
            transfer.chunk_index = 1;
        } else if done {
            let installed = transfer.snapshot.meta.last_included_index;
            progress.transfer = None;
            progress.set_match(installed);
            info!(member = self.id, follower_id, installed, "follower installed snapshot");
        } else if chunk_index == transfer.chunk_index {
            transfer.chunk_index += 1;
        } else {
            return Vec::new();
        }

        let mut effects = self.advance_commit_index();
        effects.extend(self.check_isolation());
        effects.extend(self.send_updates(follower_id));
        effects
    }

    /// Send whatever the follower needs next: a snapshot chunk, entries, or a heartbeat
    fn send_updates(&mut self, peer: MemberId) -> Vec<Effect> {
        let chunk_size = self.config.snapshot_chunk_size;
        let term = self.current_term();
        let Some(progress) = self.followers.get_mut(&peer) else {
            return Vec::new();
        };

        if progress.transfer.is_none() && (progress.force_snapshot || progress.next_index <= self.log.snapshot_index()) {
            match &self.latest_snapshot {
                Some(snapshot) if snapshot.meta.last_included_index >= self.log.snapshot_index() => {
                    info!(member = self.id, follower_id = peer, snapshot = %snapshot.meta.last_included(),
                        "follower is behind the log, sending snapshot");
                    progress.transfer = Some(SnapshotTransfer::new(snapshot.clone(), chunk_size));
                    progress.force_snapshot = false;
                }
                _ => {
                    if self.capture_in_flight {
                        return Vec::new();
                    }
                    self.capture_in_flight = true;
                    let applied = self.log.last_applied();
                    let applied_term = self.log.term_at(applied).unwrap_or(0);
                    info!(member = self.id, follower_id = peer, applied, "capturing snapshot to install on follower");
                    return vec![Effect::CaptureSnapshot {
                        reason: CaptureReason::Install(peer),
                        last_included: EntryMeta::new(applied, applied_term),
                    }];
                }
            }
        }

        if let Some(transfer) = &progress.transfer {
            let meta = transfer.snapshot.meta;
            return vec![Effect::send(
                peer,
                RaftMessage::InstallSnapshot {
                    term,
                    leader_id: self.id,
                    last_included_index: meta.last_included_index,
                    last_included_term: meta.last_included_term,
                    chunk_index: transfer.chunk_index,
                    total_chunks: transfer.total_chunks,
                    data: transfer.snapshot.chunk(transfer.chunk_index, chunk_size).to_vec(),
                },
            )];
        }

        let prev_log_index = progress.next_index - 1;
        let prev_log_term = self.log.term_at(prev_log_index).unwrap_or(0);
        let entries = self
            .log
            .entries_from(progress.next_index, self.config.max_entries_per_append);
        trace!(member = self.id, follower_id = peer, prev_log_index, entries = entries.len(), "sending append");
        vec![Effect::send(
            peer,
            RaftMessage::AppendEntries {
                term,
                leader_id: self.id,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit: self.log.commit_index(),
            },
        )]
    }

    /// Commit the highest index stored durably on a majority whose entry is from our term
    ///
    /// Entries from earlier terms are never committed by counting replicas; they commit
    /// implicitly once a later entry of the current term does.
    fn advance_commit_index(&mut self) -> Vec<Effect> {
        if !self.state.is_leader() {
            return Vec::new();
        }
        let quorum = self.quorum_size();
        let mut index = self.log.commit_index() + 1;
        while let Some(entry_term) = self.log.get(index).map(|entry| entry.term) {
            let own = usize::from(self.voting && self.log.durable_index() >= index);
            let replicated = own
                + self
                    .followers
                    .values()
                    .filter(|p| p.voting && p.match_index >= index)
                    .count();
            if replicated < quorum {
                break;
            }
            if entry_term == self.current_term() {
                self.log.set_commit_index(index);
            } else {
                trace!(member = self.id, index, entry_term, "replicated entry from an earlier term, not committing");
            }
            index += 1;
        }

        if self.log.commit_index() > self.log.last_applied() {
            debug!(member = self.id, commit_index = self.log.commit_index(), "commit index advanced");
            vec![Effect::ApplyCommitted {
                up_to: self.log.commit_index(),
            }]
        } else {
            Vec::new()
        }
    }

    fn active_voters(&self) -> usize {
        let rounds = self.config.isolation_rounds;
        let followers = self
            .followers
            .values()
            .filter(|p| p.voting && p.is_active(rounds))
            .count();
        followers + usize::from(self.voting)
    }

    /// Switch between Leader and IsolatedLeader as majority contact comes and goes
    fn check_isolation(&mut self) -> Vec<Effect> {
        let isolated = self.active_voters() < self.quorum_size();
        match (self.state, isolated) {
            (NodeState::Leader, true) => {
                warn!(member = self.id, term = self.current_term(), active = self.active_voters(),
                    needed = self.quorum_size(), "lost contact with a majority");
                self.transition(NodeState::IsolatedLeader)
            }
            (NodeState::IsolatedLeader, false) => {
                info!(member = self.id, term = self.current_term(), "majority reachable again");
                self.transition(NodeState::Leader)
            }
            _ => Vec::new(),
        }
    }

    // -- snapshots --

    fn check_snapshot_trigger(&mut self) -> Vec<Effect> {
        if self.capture_in_flight {
            return Vec::new();
        }
        let applied = self.log.last_applied();
        let since_snapshot = applied.saturating_sub(self.log.snapshot_index());
        let threshold = self.config.snapshot_data_threshold;
        let by_count = since_snapshot > 0 && since_snapshot >= self.config.snapshot_batch_count;
        let by_size = threshold > 0 && self.log.data_size() > threshold && since_snapshot > 0;
        if !by_count && !by_size {
            return Vec::new();
        }
        self.capture_in_flight = true;
        let term = self.log.term_at(applied).unwrap_or(0);
        info!(member = self.id, applied, since_snapshot, data_size = self.log.data_size(),
            "requesting snapshot capture");
        vec![Effect::CaptureSnapshot {
            reason: CaptureReason::Compaction,
            last_included: EntryMeta::new(applied, term),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_starts_as_follower() {
        let node = RaftNode::new(1, vec![1, 2, 3]);
        assert_eq!(node.state, NodeState::Follower);
        assert_eq!(node.current_term(), 0);
        assert_eq!(node.voted_for(), None);
    }

    #[test]
    fn single_member_elects_itself() {
        let mut node = RaftNode::new(1, vec![1]);
        let effects = node.handle_election_timeout();
        assert_eq!(node.state, NodeState::Leader);
        assert_eq!(effects[0], Effect::PersistTerm(TermInfo::new(1, Some(1))));
    }

    #[test]
    fn non_voting_member_never_campaigns() {
        let members = vec![PeerInfo::voting(1), PeerInfo::non_voting(2)];
        let mut node = RaftNode::with_members(2, members, RaftConfig::default());
        assert!(node.start().is_empty());
        assert!(node.handle_election_timeout().is_empty());
        assert_eq!(node.state, NodeState::Follower);
    }

    #[test]
    fn election_jitter_stays_in_range() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        for _ in 0..50 {
            match node.election_timer() {
                Effect::ScheduleTimer { after, .. } => {
                    assert!(after >= Duration::from_millis(150) && after <= Duration::from_millis(300));
                }
                other => panic!("unexpected effect {other:?}"),
            }
        }
    }
}
