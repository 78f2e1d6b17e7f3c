//! # member
//!
//! why: drive the pure consensus core against real storage, a transport, timers and the application
//! relations: owns a raft-core RaftNode and a raft-storage RaftStorage; the embedder feeds it messages and timeouts
//! what: RaftMember (recovery, ordered effect execution, persistence completions, fatal-fault stop), MemberSetup
//!
//! Effects run strictly in the order the core emitted them; follow-up effects produced while
//! executing one (apply, snapshot capture, install) run before the rest of the batch. The first
//! failing durability effect stops the member for good: nothing after it runs, and every later
//! call returns `MemberError::Stopped`.

use crate::application::Application;
use crate::error::{MemberError, Result};
use crate::timer::TimerService;
use crate::transport::Transport;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use raft_core::{
    Effect, EntryMeta, Event, LogIndex, MemberId, NodeStatus, PeerInfo, RaftConfig, RaftMessage, RaftNode, SnapshotMeta,
    TimerKind,
};
use raft_storage::{RaftStorage, Recovered, StorageError};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Outcome of persisting one entry, reported back from the entry store
#[derive(Debug)]
pub struct Completion {
    pub entry: EntryMeta,
    pub result: raft_storage::Result<()>,
}

/// Everything a member is built from besides its storage
pub struct MemberSetup<T, S, A> {
    pub id: MemberId,
    /// every configured member, this one included
    pub members: Vec<PeerInfo>,
    pub config: RaftConfig,
    pub transport: T,
    pub timers: S,
    pub application: A,
}

/// A running cluster member
pub struct RaftMember<T, S, A> {
    node: RaftNode,
    storage: RaftStorage,
    transport: T,
    timers: S,
    application: A,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    /// persist requests whose completion has not been handled yet
    outstanding: usize,
    stopped: bool,
}

impl<T: Transport, S: TimerService, A: Application> RaftMember<T, S, A> {
    /// Rebuild a member from recovered storage
    ///
    /// The newest snapshot is restored into the application, then every entry up to the recovered
    /// apply bound is replayed into it. Timers stay unarmed until [`RaftMember::start`].
    pub fn recover(setup: MemberSetup<T, S, A>, storage: RaftStorage, recovered: Recovered) -> Result<Self> {
        setup.config.validate()?;
        let MemberSetup {
            id,
            members,
            config,
            transport,
            timers,
            mut application,
        } = setup;
        let Recovered {
            term_info,
            snapshot,
            log,
            apply_to,
        } = recovered;

        let mut node = RaftNode::with_members(id, members, config).with_state(term_info, log);
        let mut effects = Vec::new();
        if let Some((meta, data)) = snapshot {
            application
                .restore_snapshot(meta, &data)
                .map_err(MemberError::application)?;
            debug!(member = id, snapshot = %meta.last_included(), "restored snapshot into application");
            effects.extend(node.snapshot_captured(meta, data));
        }
        effects.extend(
            node.apply_committed(|entry| application.apply(entry))
                .map_err(MemberError::application)?,
        );
        info!(
            member = id,
            term = node.current_term(),
            last_index = node.last_log_index(),
            replayed_to = node.log().last_applied(),
            apply_to,
            "member recovered"
        );

        let (completions_tx, completions_rx) = crossbeam_channel::unbounded();
        let mut member = Self {
            node,
            storage,
            transport,
            timers,
            application,
            completions_tx,
            completions_rx,
            outstanding: 0,
            stopped: false,
        };
        member.run(effects)?;
        Ok(member)
    }

    // -- accessors --

    pub fn id(&self) -> MemberId {
        self.node.id
    }

    pub fn node(&self) -> &RaftNode {
        &self.node
    }

    pub fn status(&self) -> NodeStatus {
        self.node.status()
    }

    pub fn application(&self) -> &A {
        &self.application
    }

    pub fn application_mut(&mut self) -> &mut A {
        &mut self.application
    }

    pub fn storage(&self) -> &RaftStorage {
        &self.storage
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn timers(&self) -> &S {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut S {
        &mut self.timers
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Persist requests still waiting for their completion
    pub fn outstanding_persists(&self) -> usize {
        self.outstanding
    }

    /// Channel the entry store reports persistence on, for embedders that select over inputs
    pub fn completions(&self) -> Receiver<Completion> {
        self.completions_rx.clone()
    }

    // -- inputs --

    /// Arm the election timer
    pub fn start(&mut self) -> Result<()> {
        self.ensure_running()?;
        let effects = self.node.start();
        self.run(effects)
    }

    pub fn handle_timeout(&mut self, timer: TimerKind) -> Result<()> {
        self.ensure_running()?;
        let effects = self.node.step(Event::Timeout(timer));
        self.run(effects)
    }

    pub fn handle_message(&mut self, from: MemberId, message: RaftMessage) -> Result<()> {
        self.ensure_running()?;
        let effects = self.node.step(Event::Message { from, message });
        self.run(effects)
    }

    /// Submit a client command; returns the index it will occupy once committed
    ///
    /// Only a leader in contact with a majority accepts commands. An accepted command is not yet
    /// committed, and may never be if leadership is lost first.
    pub fn propose(&mut self, command: Vec<u8>) -> Result<LogIndex> {
        self.ensure_running()?;
        let (index, effects) = self.node.propose(command)?;
        self.run(effects)?;
        Ok(index)
    }

    /// Handle one persistence outcome taken from [`RaftMember::completions`]
    pub fn handle_completion(&mut self, completion: Completion) -> Result<()> {
        self.ensure_running()?;
        self.outstanding = self.outstanding.saturating_sub(1);
        match completion.result {
            Ok(()) => {
                let effects = self.node.step(Event::EntriesPersisted {
                    up_to: completion.entry,
                });
                self.execute(effects)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Handle every completion that is already available
    pub fn drain_completions(&mut self) -> Result<usize> {
        let mut handled = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.handle_completion(completion)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Block until every outstanding persist has completed, or `timeout` passes
    ///
    /// Returns false on timeout.
    pub fn await_persisted(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        while self.outstanding > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.completions_rx.recv_timeout(remaining) {
                Ok(completion) => self.handle_completion(completion)?,
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => return Err(MemberError::Stopped),
            }
        }
        Ok(true)
    }

    // -- execution --

    fn ensure_running(&self) -> Result<()> {
        if self.stopped {
            return Err(MemberError::Stopped);
        }
        Ok(())
    }

    /// Execute effects, then pick up whatever persisted meanwhile
    fn run(&mut self, effects: Vec<Effect>) -> Result<()> {
        self.execute(effects)?;
        self.drain_completions()?;
        Ok(())
    }

    fn fail(&mut self, e: StorageError) -> MemberError {
        error!(member = self.node.id, error = %e, "storage fault, stopping member");
        self.stopped = true;
        MemberError::Storage(e)
    }

    fn execute(&mut self, effects: Vec<Effect>) -> Result<()> {
        let mut queue: VecDeque<Effect> = effects.into();
        let mut deferred = None;
        while let Some(effect) = queue.pop_front() {
            self.ensure_running()?;
            match self.execute_one(effect) {
                Ok(follow_up) => {
                    for effect in follow_up.into_iter().rev() {
                        queue.push_front(effect);
                    }
                }
                Err(e @ MemberError::Application { .. }) if !self.stopped => {
                    warn!(member = self.node.id, error = %e, "application error");
                    deferred.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        match deferred {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run one effect, returning the effects it caused
    fn execute_one(&mut self, effect: Effect) -> Result<Vec<Effect>> {
        match effect {
            Effect::PersistTerm(info) => {
                if let Err(e) = self.storage.terms().store_and_set_term(info) {
                    return Err(self.fail(e));
                }
                trace!(member = self.node.id, %info, "term persisted");
            }
            Effect::PersistEntries { entries, sync } => {
                for entry in entries {
                    let meta = entry.meta();
                    let tx = self.completions_tx.clone();
                    let callback = Box::new(move |result: raft_storage::Result<()>| {
                        let _ = tx.send(Completion { entry: meta, result });
                    });
                    self.outstanding += 1;
                    if sync {
                        self.storage.entries().persist_and_sync(entry, callback);
                    } else {
                        self.storage.entries().persist(entry, callback);
                    }
                }
            }
            Effect::TruncateFrom(index) => {
                if let Err(e) = self.storage.entries().remove_from(index) {
                    return Err(self.fail(e));
                }
            }
            Effect::CompactTo(meta) => {
                if let Err(e) = self.storage.entries().compact_to(meta) {
                    return Err(self.fail(e));
                }
            }
            Effect::Send { to, message } => self.transport.send(to, message),
            Effect::ScheduleTimer { timer, after } => self.timers.schedule(timer, after),
            Effect::CancelTimer(timer) => self.timers.cancel(timer),
            Effect::ApplyCommitted { .. } => return self.apply_committed(),
            Effect::CaptureSnapshot {
                reason,
                last_included,
            } => {
                let data = match self.application.capture_snapshot() {
                    Ok(data) => data,
                    Err(e) => {
                        warn!(member = self.node.id, ?reason, error = %e, "application could not capture snapshot");
                        self.node.snapshot_capture_failed();
                        return Ok(Vec::new());
                    }
                };
                let meta = SnapshotMeta::new(last_included.index, last_included.term);
                if let Err(e) = self.storage.save_snapshot(meta, &data) {
                    return Err(self.fail(e));
                }
                debug!(member = self.node.id, ?reason, snapshot = %last_included, bytes = data.len(), "snapshot captured");
                return Ok(self.node.snapshot_captured(meta, data));
            }
            Effect::InstallSnapshot { meta, data } => {
                if let Err(e) = self.storage.save_snapshot(meta, &data) {
                    return Err(self.fail(e));
                }
                if let Err(e) = self.application.restore_snapshot(meta, &data) {
                    error!(member = self.node.id, error = %e, "application could not restore snapshot, stopping member");
                    self.stopped = true;
                    return Err(MemberError::application(e));
                }
                return Ok(self.node.snapshot_installed(meta));
            }
            Effect::StateChanged { from, to } => {
                debug!(member = self.node.id, term = self.node.current_term(), %from, %to, "state changed");
            }
        }
        Ok(Vec::new())
    }

    fn apply_committed(&mut self) -> Result<Vec<Effect>> {
        let application = &mut self.application;
        let outcome = self.node.apply_committed(|entry| application.apply(entry));
        let applied = self.node.log().last_applied();
        if let Err(e) = self.storage.entries().apply_to(applied) {
            return Err(self.fail(e));
        }
        outcome.map_err(MemberError::application)
    }
}

impl<T, S, A> std::fmt::Debug for RaftMember<T, S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaftMember")
            .field("node", &self.node.status())
            .field("outstanding", &self.outstanding)
            .field("stopped", &self.stopped)
            .finish()
    }
}
