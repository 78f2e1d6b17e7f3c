//! # comprehensive member tests
//!
//! why: verify members agree on one history when wired to real storage, a router and timers
//! relations: tests raft-member against raft-core and raft-storage
//! what: recovery, elections, replication, isolation, durable restarts, snapshots, faults, safety

use crossbeam_channel::{Receiver, Sender};
use proptest::prelude::*;
use raft_core::{LogEntry, LogIndex, MemberId, NodeState, PeerInfo, RaftConfig, RaftError, SnapshotMeta, TimerKind};
use raft_member::{Application, ChannelTransport, Envelope, MemberError, MemberSetup, RaftMember, TimerTable};
use raft_storage::{RaftStorage, StorageConfig, SyncPolicy};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

/// Application that records every command it applies
#[derive(Debug, Default)]
struct Ledger {
    commands: Vec<String>,
    restored_from: Option<SnapshotMeta>,
    fail_at: Option<LogIndex>,
    refuse_capture: bool,
}

impl Application for Ledger {
    type Error = String;

    fn apply(&mut self, entry: &LogEntry) -> Result<(), String> {
        if self.fail_at == Some(entry.index) {
            return Err(format!("refusing entry {}", entry.index));
        }
        self.commands.push(String::from_utf8_lossy(&entry.command).into_owned());
        Ok(())
    }

    fn capture_snapshot(&mut self) -> Result<Vec<u8>, String> {
        if self.refuse_capture {
            return Err("capture refused".to_string());
        }
        serde_json::to_vec(&self.commands).map_err(|e| e.to_string())
    }

    fn restore_snapshot(&mut self, meta: SnapshotMeta, data: &[u8]) -> Result<(), String> {
        self.commands = serde_json::from_slice(data).map_err(|e| e.to_string())?;
        self.restored_from = Some(meta);
        Ok(())
    }
}

type Member = RaftMember<ChannelTransport, TimerTable, Ledger>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> RaftConfig {
    RaftConfig {
        rng_seed: Some(7),
        ..RaftConfig::default()
    }
}

fn snapshot_config() -> RaftConfig {
    RaftConfig {
        snapshot_batch_count: 5,
        snapshot_chunk_size: 16,
        ..config()
    }
}

fn commands(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Members wired through one router channel; nothing moves until the test delivers it
struct Cluster {
    ids: Vec<MemberId>,
    config: RaftConfig,
    members: BTreeMap<MemberId, Member>,
    dirs: BTreeMap<MemberId, TempDir>,
    outbox: Sender<Envelope>,
    router: Receiver<Envelope>,
    partitioned: BTreeSet<MemberId>,
}

impl Cluster {
    fn in_memory(ids: &[MemberId], config: RaftConfig) -> Self {
        Self::build(ids, config, false)
    }

    fn on_disk(ids: &[MemberId], config: RaftConfig) -> Self {
        Self::build(ids, config, true)
    }

    fn build(ids: &[MemberId], config: RaftConfig, durable: bool) -> Self {
        init_tracing();
        let (outbox, router) = crossbeam_channel::unbounded();
        let mut cluster = Self {
            ids: ids.to_vec(),
            config,
            members: BTreeMap::new(),
            dirs: BTreeMap::new(),
            outbox,
            router,
            partitioned: BTreeSet::new(),
        };
        for &id in ids {
            if durable {
                cluster.dirs.insert(id, TempDir::new().unwrap());
            }
            cluster.spawn(id);
        }
        cluster
    }

    fn spawn(&mut self, id: MemberId) {
        let (storage, recovered) = match self.dirs.get(&id) {
            Some(dir) => RaftStorage::open(StorageConfig {
                sync: SyncPolicy::Always,
                ..StorageConfig::new(dir.path())
            })
            .unwrap(),
            None => RaftStorage::disabled(),
        };
        let setup = MemberSetup {
            id,
            members: self.ids.iter().map(|&i| PeerInfo::voting(i)).collect(),
            config: self.config.clone(),
            transport: ChannelTransport::new(id, self.outbox.clone()),
            timers: TimerTable::new(),
            application: Ledger::default(),
        };
        let mut member = RaftMember::recover(setup, storage, recovered).unwrap();
        member.start().unwrap();
        self.members.insert(id, member);
    }

    fn member(&self, id: MemberId) -> &Member {
        &self.members[&id]
    }

    fn member_mut(&mut self, id: MemberId) -> &mut Member {
        self.members.get_mut(&id).unwrap()
    }

    fn commands(&self, id: MemberId) -> Vec<String> {
        self.member(id).application().commands.clone()
    }

    fn leaders(&self) -> Vec<MemberId> {
        self.members
            .values()
            .filter(|m| m.status().state == NodeState::Leader)
            .map(|m| m.id())
            .collect()
    }

    fn partition(&mut self, id: MemberId) {
        self.partitioned.insert(id);
    }

    fn heal(&mut self, id: MemberId) {
        self.partitioned.remove(&id);
    }

    /// Drop the member and everything it held in memory
    fn crash(&mut self, id: MemberId) {
        self.members.remove(&id);
    }

    fn restart(&mut self, id: MemberId) {
        self.spawn(id);
    }

    /// Route one message; false when the router is empty
    fn deliver_one(&mut self) -> bool {
        let Ok(envelope) = self.router.try_recv() else {
            return false;
        };
        if self.partitioned.contains(&envelope.from) || self.partitioned.contains(&envelope.to) {
            return true;
        }
        if let Some(member) = self.members.get_mut(&envelope.to) {
            let _ = member.handle_message(envelope.from, envelope.message);
        }
        true
    }

    fn drop_one(&mut self) {
        let _ = self.router.try_recv();
    }

    /// Deliver messages and wait for persistence until nothing is left moving
    fn settle(&mut self) {
        for _ in 0..10_000 {
            let mut progressed = false;
            while self.deliver_one() {
                progressed = true;
            }
            for member in self.members.values_mut() {
                if member.outstanding_persists() > 0 && !member.is_stopped() {
                    progressed = true;
                    let _ = member.await_persisted(Duration::from_secs(5));
                }
            }
            if !progressed {
                return;
            }
        }
        panic!("cluster did not settle");
    }

    fn timeout(&mut self, id: MemberId, timer: TimerKind) {
        let _ = self.member_mut(id).handle_timeout(timer);
        self.settle();
    }

    fn elect(&mut self, id: MemberId) {
        self.timeout(id, TimerKind::Election);
        assert_eq!(self.member(id).status().state, NodeState::Leader);
    }

    fn propose(&mut self, id: MemberId, command: &str) -> Result<LogIndex, MemberError> {
        let result = self.member_mut(id).propose(command.as_bytes().to_vec());
        self.settle();
        result
    }

    /// Propose every command on `leader`, then let a heartbeat carry the commit index out
    fn replicate(&mut self, leader: MemberId, names: &[&str]) {
        for name in names {
            self.propose(leader, name).unwrap();
        }
        self.timeout(leader, TimerKind::Heartbeat);
    }
}

// ============================================================================
// SECTION 1: STARTUP AND RECOVERY
// ============================================================================

mod startup {
    use super::*;

    #[test]
    fn fresh_member_is_follower_with_election_timer() {
        let cluster = Cluster::in_memory(&[1, 2, 3], config());
        let member = cluster.member(1);
        let status = member.status();
        assert_eq!(status.state, NodeState::Follower);
        assert_eq!(status.term, 0);
        assert_eq!(status.last_index, 0);
        assert!(member.timers().is_armed(TimerKind::Election));
        assert!(!member.timers().is_armed(TimerKind::Heartbeat));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let (outbox, _router) = crossbeam_channel::unbounded();
        let setup = MemberSetup {
            id: 1,
            members: vec![PeerInfo::voting(1)],
            config: RaftConfig {
                election_timeout_min: 300,
                election_timeout_max: 150,
                ..config()
            },
            transport: ChannelTransport::new(1, outbox),
            timers: TimerTable::new(),
            application: Ledger::default(),
        };
        let (storage, recovered) = RaftStorage::disabled();
        let err = RaftMember::recover(setup, storage, recovered).err().unwrap();
        assert!(matches!(err, MemberError::Raft(RaftError::InvalidConfig { .. })));
    }

    #[test]
    fn single_member_elects_itself_and_commits() {
        let mut cluster = Cluster::in_memory(&[1], config());
        cluster.elect(1);
        assert_eq!(cluster.propose(1, "a").unwrap(), 1);
        assert_eq!(cluster.propose(1, "b").unwrap(), 2);
        assert_eq!(cluster.commands(1), commands(&["a", "b"]));
        assert_eq!(cluster.member(1).status().commit_index, 2);
    }

    #[test]
    fn restart_without_storage_forgets_everything() {
        let mut cluster = Cluster::in_memory(&[1], config());
        cluster.elect(1);
        cluster.propose(1, "a").unwrap();
        cluster.crash(1);
        cluster.restart(1);
        let status = cluster.member(1).status();
        assert_eq!(status.term, 0);
        assert_eq!(status.last_index, 0);
        assert!(cluster.commands(1).is_empty());
    }
}

// ============================================================================
// SECTION 2: ELECTIONS
// ============================================================================

mod election {
    use super::*;

    #[test]
    fn elected_leader_is_unique_and_known() {
        let mut cluster = Cluster::in_memory(&[1, 2, 3], config());
        cluster.elect(1);
        assert_eq!(cluster.leaders(), vec![1]);
        for id in [2, 3] {
            let status = cluster.member(id).status();
            assert_eq!(status.state, NodeState::Follower);
            assert_eq!(status.leader, Some(1));
            assert_eq!(status.term, 1);
        }
        let leader = cluster.member(1);
        assert!(leader.timers().is_armed(TimerKind::Heartbeat));
        assert!(!leader.timers().is_armed(TimerKind::Election));
    }

    #[test]
    fn later_election_replaces_leader() {
        let mut cluster = Cluster::in_memory(&[1, 2, 3], config());
        cluster.elect(1);
        cluster.elect(2);
        assert_eq!(cluster.leaders(), vec![2]);
        assert_eq!(cluster.member(1).status().state, NodeState::Follower);
        assert_eq!(cluster.member(1).status().term, 2);
    }

    #[test]
    fn vote_survives_restart() {
        let mut cluster = Cluster::on_disk(&[1, 2, 3], config());
        cluster.elect(1);
        cluster.crash(2);
        cluster.restart(2);
        let status = cluster.member(2).status();
        assert_eq!(status.term, 1);
        assert_eq!(status.voted_for, Some(1));
    }

    #[test]
    fn candidate_without_votes_stays_candidate() {
        let mut cluster = Cluster::in_memory(&[1, 2, 3], config());
        cluster.partition(1);
        cluster.timeout(1, TimerKind::Election);
        let status = cluster.member(1).status();
        assert_eq!(status.state, NodeState::Candidate);
        assert_eq!(status.term, 1);
        assert!(cluster.member(1).timers().is_armed(TimerKind::Election));
    }
}

// ============================================================================
// SECTION 3: REPLICATION
// ============================================================================

mod replication {
    use super::*;

    #[test]
    fn committed_commands_reach_every_application() {
        let mut cluster = Cluster::in_memory(&[1, 2, 3], config());
        cluster.elect(1);
        cluster.replicate(1, &["a", "b", "c"]);
        for id in [1, 2, 3] {
            assert_eq!(cluster.commands(id), commands(&["a", "b", "c"]), "member {id}");
            assert_eq!(cluster.member(id).status().commit_index, 3);
        }
    }

    #[test]
    fn followers_reject_proposals() {
        let mut cluster = Cluster::in_memory(&[1, 2, 3], config());
        cluster.elect(1);
        let err = cluster.propose(2, "x").unwrap_err();
        assert!(matches!(err, MemberError::Raft(RaftError::NotLeader { leader: Some(1) })));
    }

    #[test]
    fn lagging_follower_catches_up_after_partition() {
        let mut cluster = Cluster::in_memory(&[1, 2, 3], config());
        cluster.elect(1);
        cluster.partition(3);
        cluster.replicate(1, &["a", "b", "c", "d", "e"]);
        assert!(cluster.commands(3).is_empty());
        assert_eq!(cluster.commands(2).len(), 5);

        cluster.heal(3);
        cluster.timeout(1, TimerKind::Heartbeat);
        cluster.timeout(1, TimerKind::Heartbeat);
        assert_eq!(cluster.commands(3), commands(&["a", "b", "c", "d", "e"]));
    }

    #[test]
    fn minority_cannot_commit() {
        let mut cluster = Cluster::in_memory(&[1, 2, 3], config());
        cluster.elect(1);
        cluster.partition(2);
        cluster.partition(3);
        cluster.propose(1, "lost").unwrap();
        assert_eq!(cluster.member(1).status().last_index, 1);
        assert_eq!(cluster.member(1).status().commit_index, 0);
        assert!(cluster.commands(1).is_empty());
    }
}

// ============================================================================
// SECTION 4: LEADER ISOLATION
// ============================================================================

mod isolation {
    use super::*;

    #[test]
    fn silent_majority_isolates_leader() {
        let mut cluster = Cluster::in_memory(&[1, 2, 3], config());
        cluster.elect(1);
        cluster.partition(2);
        cluster.partition(3);
        for _ in 0..8 {
            cluster.timeout(1, TimerKind::Heartbeat);
        }
        assert_eq!(cluster.member(1).status().state, NodeState::IsolatedLeader);
        let err = cluster.propose(1, "x").unwrap_err();
        assert!(matches!(err, MemberError::Raft(RaftError::NoQuorum { .. })));
    }

    #[test]
    fn reconnected_majority_restores_leadership() {
        let mut cluster = Cluster::in_memory(&[1, 2, 3], config());
        cluster.elect(1);
        cluster.partition(2);
        cluster.partition(3);
        for _ in 0..8 {
            cluster.timeout(1, TimerKind::Heartbeat);
        }
        cluster.heal(2);
        cluster.heal(3);
        cluster.timeout(1, TimerKind::Heartbeat);
        assert_eq!(cluster.member(1).status().state, NodeState::Leader);
        cluster.replicate(1, &["back"]);
        assert_eq!(cluster.commands(2), commands(&["back"]));
    }
}

// ============================================================================
// SECTION 5: DURABLE RESTARTS
// ============================================================================

mod durability {
    use super::*;

    #[test]
    fn restart_replays_applied_entries() {
        let mut cluster = Cluster::on_disk(&[1, 2, 3], config());
        cluster.elect(1);
        cluster.replicate(1, &["a", "b", "c"]);
        cluster.crash(2);
        cluster.restart(2);

        let member = cluster.member(2);
        assert_eq!(member.application().commands, commands(&["a", "b", "c"]));
        let status = member.status();
        assert_eq!(status.term, 1);
        assert_eq!(status.last_index, 3);
        assert_eq!(status.last_applied, 3);
    }

    #[test]
    fn whole_cluster_restart_keeps_committed_log() {
        let mut cluster = Cluster::on_disk(&[1, 2, 3], config());
        cluster.elect(1);
        cluster.replicate(1, &["a", "b", "c"]);
        for id in [1, 2, 3] {
            cluster.crash(id);
        }
        for id in [1, 2, 3] {
            cluster.restart(id);
        }
        cluster.elect(2);
        assert_eq!(cluster.member(2).status().term, 2);
        cluster.replicate(2, &["d"]);
        for id in [1, 2, 3] {
            assert_eq!(cluster.commands(id), commands(&["a", "b", "c", "d"]), "member {id}");
        }
    }

    #[test]
    fn restarted_follower_rejoins_and_catches_up() {
        let mut cluster = Cluster::on_disk(&[1, 2, 3], config());
        cluster.elect(1);
        cluster.replicate(1, &["a"]);
        cluster.crash(3);
        cluster.replicate(1, &["b", "c"]);
        cluster.restart(3);
        assert_eq!(cluster.commands(3), commands(&["a"]));
        cluster.timeout(1, TimerKind::Heartbeat);
        cluster.timeout(1, TimerKind::Heartbeat);
        assert_eq!(cluster.commands(3), commands(&["a", "b", "c"]));
    }
}

// ============================================================================
// SECTION 6: SNAPSHOTS
// ============================================================================

mod snapshots {
    use super::*;

    const TWELVE: [&str; 12] = ["c1", "c2", "c3", "c4", "c5", "c6", "c7", "c8", "c9", "c10", "c11", "c12"];

    #[test]
    fn applied_entries_trigger_capture_and_compaction() {
        let mut cluster = Cluster::in_memory(&[1, 2, 3], snapshot_config());
        cluster.elect(1);
        cluster.replicate(1, &TWELVE);
        for id in [1, 2, 3] {
            let member = cluster.member(id);
            let snapshot_index = member.status().snapshot_index;
            assert!(snapshot_index >= 5, "member {id} never compacted");
            let latest = member.storage().latest_snapshot().unwrap();
            assert_eq!(latest.meta.last_included_index, snapshot_index);
            assert_eq!(member.application().commands, commands(&TWELVE));
        }
    }

    #[test]
    fn lagging_member_is_installed_from_snapshot() {
        let mut cluster = Cluster::in_memory(&[1, 2, 3], snapshot_config());
        cluster.elect(1);
        cluster.partition(3);
        cluster.replicate(1, &TWELVE);
        assert!(cluster.member(1).status().snapshot_index >= 5);

        cluster.heal(3);
        for _ in 0..3 {
            cluster.timeout(1, TimerKind::Heartbeat);
        }
        let member = cluster.member(3);
        let restored = member.application().restored_from.expect("snapshot installed");
        assert!(restored.last_included_index >= 5);
        assert_eq!(member.application().commands, commands(&TWELVE));
        assert_eq!(member.status().snapshot_index, restored.last_included_index);
    }

    #[test]
    fn installed_snapshot_survives_restart() {
        let mut cluster = Cluster::on_disk(&[1, 2, 3], snapshot_config());
        cluster.elect(1);
        cluster.partition(3);
        cluster.replicate(1, &TWELVE);
        cluster.heal(3);
        for _ in 0..3 {
            cluster.timeout(1, TimerKind::Heartbeat);
        }
        cluster.crash(3);
        cluster.restart(3);

        let member = cluster.member(3);
        assert!(member.application().restored_from.is_some());
        assert_eq!(member.application().commands, commands(&TWELVE));
        assert!(member.status().snapshot_index >= 5);
    }
}

// ============================================================================
// SECTION 7: FAULTS
// ============================================================================

mod faults {
    use super::*;

    #[test]
    fn storage_fault_stops_member() {
        let mut cluster = Cluster::on_disk(&[1, 2, 3], config());
        let dir = cluster.dirs[&3].path().to_path_buf();
        fs::remove_dir_all(&dir).unwrap();

        let err = cluster.member_mut(3).handle_timeout(TimerKind::Election).unwrap_err();
        assert!(matches!(err, MemberError::Storage(_)));
        let member = cluster.member_mut(3);
        assert!(member.is_stopped());
        assert!(matches!(
            member.handle_timeout(TimerKind::Election),
            Err(MemberError::Stopped)
        ));
        assert!(matches!(member.propose(b"x".to_vec()), Err(MemberError::Stopped)));
    }

    #[test]
    fn remaining_members_continue_after_fault() {
        let mut cluster = Cluster::on_disk(&[1, 2, 3], config());
        fs::remove_dir_all(cluster.dirs[&3].path()).unwrap();
        cluster.elect(1);
        cluster.replicate(1, &["a", "b"]);
        assert_eq!(cluster.commands(2), commands(&["a", "b"]));
        assert!(cluster.member(3).is_stopped());
    }

    #[test]
    fn failed_apply_is_retried_on_next_commit() {
        let mut cluster = Cluster::in_memory(&[1], config());
        cluster.elect(1);
        cluster.member_mut(1).application_mut().fail_at = Some(2);
        cluster.propose(1, "a").unwrap();

        let err = cluster.propose(1, "b").unwrap_err();
        assert!(matches!(err, MemberError::Application { .. }));
        let member = cluster.member(1);
        assert!(!member.is_stopped());
        assert_eq!(member.status().last_applied, 1);

        cluster.member_mut(1).application_mut().fail_at = None;
        cluster.propose(1, "c").unwrap();
        assert_eq!(cluster.commands(1), commands(&["a", "b", "c"]));
    }

    #[test]
    fn failed_capture_is_not_fatal() {
        let mut cluster = Cluster::in_memory(
            &[1],
            RaftConfig {
                snapshot_batch_count: 2,
                ..config()
            },
        );
        cluster.elect(1);
        cluster.member_mut(1).application_mut().refuse_capture = true;
        for name in ["a", "b", "c"] {
            cluster.propose(1, name).unwrap();
        }
        assert_eq!(cluster.member(1).status().snapshot_index, 0);
        assert!(!cluster.member(1).is_stopped());

        cluster.member_mut(1).application_mut().refuse_capture = false;
        cluster.propose(1, "d").unwrap();
        assert_eq!(cluster.member(1).status().snapshot_index, 4);
        assert_eq!(cluster.commands(1).len(), 4);
    }
}

// ============================================================================
// SECTION 8: TRANSPORT AND TIMERS
// ============================================================================

mod seams {
    use super::*;

    #[test]
    fn channel_transport_wraps_envelopes() {
        let mut cluster = Cluster::in_memory(&[1, 2, 3], config());
        let _ = cluster.member_mut(1).handle_timeout(TimerKind::Election);
        let mut requests = Vec::new();
        while let Ok(envelope) = cluster.router.try_recv() {
            requests.push(envelope);
        }
        let targets: BTreeSet<MemberId> = requests.iter().map(|e| e.to).collect();
        assert_eq!(targets, BTreeSet::from([2, 3]));
        assert!(requests.iter().all(|e| e.from == 1 && e.message.term() == 1));
    }

    #[test]
    fn envelope_serializes() {
        let mut cluster = Cluster::in_memory(&[1, 2], config());
        let _ = cluster.member_mut(1).handle_timeout(TimerKind::Election);
        let envelope = cluster.router.try_recv().unwrap();
        let json = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn timer_table_drives_election() {
        let mut cluster = Cluster::in_memory(&[1], config());
        let remaining = cluster.member(1).timers().remaining(TimerKind::Election).unwrap();
        assert!(remaining >= Duration::from_millis(150) && remaining <= Duration::from_millis(300));

        let expired = cluster
            .member_mut(1)
            .timers_mut()
            .advance(Duration::from_millis(300));
        assert_eq!(expired, vec![TimerKind::Election]);
        for timer in expired {
            cluster.timeout(1, timer);
        }
        let member = cluster.member(1);
        assert_eq!(member.status().state, NodeState::Leader);
        assert!(member.timers().is_armed(TimerKind::Heartbeat));
    }
}

// ============================================================================
// SECTION 9: SAFETY UNDER RANDOM SCHEDULES
// ============================================================================

mod safety {
    use super::*;

    #[derive(Debug, Clone)]
    enum Step {
        Election(usize),
        Heartbeat(usize),
        Deliver(usize),
        Drop(usize),
        Propose(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            1 => (0..3usize).prop_map(Step::Election),
            2 => (0..3usize).prop_map(Step::Heartbeat),
            4 => (1..12usize).prop_map(Step::Deliver),
            1 => (1..3usize).prop_map(Step::Drop),
            2 => (0..3usize).prop_map(Step::Propose),
        ]
    }

    fn is_prefix(a: &[String], b: &[String]) -> bool {
        let n = a.len().min(b.len());
        a[..n] == b[..n]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn random_schedules_keep_histories_consistent(steps in prop::collection::vec(step(), 1..80)) {
            let ids = [1, 2, 3];
            let mut cluster = Cluster::in_memory(&ids, config());
            let mut leaders_by_term: BTreeMap<u64, MemberId> = BTreeMap::new();

            for (n, step) in steps.into_iter().enumerate() {
                match step {
                    Step::Election(i) => {
                        let _ = cluster.member_mut(ids[i]).handle_timeout(TimerKind::Election);
                    }
                    Step::Heartbeat(i) => {
                        let _ = cluster.member_mut(ids[i]).handle_timeout(TimerKind::Heartbeat);
                    }
                    Step::Deliver(count) => {
                        for _ in 0..count {
                            cluster.deliver_one();
                        }
                    }
                    Step::Drop(count) => {
                        for _ in 0..count {
                            cluster.drop_one();
                        }
                    }
                    Step::Propose(i) => {
                        let _ = cluster.member_mut(ids[i]).propose(format!("cmd-{n}").into_bytes());
                    }
                }

                for member in cluster.members.values() {
                    let status = member.status();
                    if status.state.is_leader() {
                        let leader = *leaders_by_term.entry(status.term).or_insert(status.id);
                        prop_assert_eq!(leader, status.id, "two leaders in term {}", status.term);
                    }
                }
                for a in &ids {
                    for b in &ids {
                        prop_assert!(is_prefix(&cluster.commands(*a), &cluster.commands(*b)),
                            "members {} and {} applied diverging histories", a, b);
                    }
                }
            }
        }
    }
}
