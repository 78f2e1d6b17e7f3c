//! # journal
//!
//! why: log entries must be durable before a member acknowledges them, without a disk round trip per entry
//! relations: EntryStore is implemented here for RaftStorage; record.rs frames entries; recovery feeds storage.rs
//! what: EntryStore trait, EntryJournal (append-only file + writer thread with group commit), MemoryEntryStore
//!
//! The journal lives in `entries.journal` next to `journal-meta.json`. Appends are queued to a
//! writer thread which drains everything pending, writes it, syncs once if any request asked for
//! it, then fires the callbacks in append order. Truncation and compaction go through the same
//! queue so they are ordered after every earlier append, and the caller waits for them.

use crate::atomic;
use crate::config::SyncPolicy;
use crate::error::{Result, StorageError};
use crate::record::{self, RecordError};
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use raft_core::{EntryMeta, ImmutableIndexSet, LogEntry, LogIndex, MutableIndexSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

const JOURNAL_FILE: &str = "entries.journal";
const JOURNAL_TEMP_FILE: &str = "entries.journal.tmp";
const META_FILE: &str = "journal-meta.json";

/// Fired once the entry is durable, or with the error that prevented it
pub type PersistCallback = Box<dyn FnOnce(Result<()>) + Send>;

/// The durability boundary for individual log entries
pub trait EntryStore: Send {
    /// Append asynchronously; callbacks fire in append order
    fn persist(&mut self, entry: LogEntry, callback: PersistCallback);

    /// Like `persist`, with a sync to stable storage before the callback
    fn persist_and_sync(&mut self, entry: LogEntry, callback: PersistCallback);

    /// Drop every entry with `index >= from`; returns once the truncation is done
    fn remove_from(&mut self, from: LogIndex) -> Result<()>;

    /// Drop every entry up to and including `meta`, now covered by a durable snapshot
    fn compact_to(&mut self, meta: EntryMeta) -> Result<()>;

    /// Record that entries up to `index` have been applied; bounds replay after a restart
    fn apply_to(&mut self, index: LogIndex) -> Result<()>;
}

/// Replay bounds kept beside the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalMeta {
    /// first index still held by the journal; everything before is in a snapshot
    pub replay_from: LogIndex,
    /// highest index the application is known to have applied
    pub apply_to: LogIndex,
}

impl Default for JournalMeta {
    fn default() -> Self {
        Self {
            replay_from: 1,
            apply_to: 0,
        }
    }
}

/// What the journal held when it was opened
#[derive(Debug, Clone, Default)]
pub struct RecoveredJournal {
    pub meta: JournalMeta,
    /// contiguous entries starting at `meta.replay_from`
    pub entries: Vec<LogEntry>,
    pub indices: ImmutableIndexSet,
}

// -- writer thread --

enum Command {
    Append {
        record: Bytes,
        sync: bool,
        callback: PersistCallback,
    },
    Truncate {
        offset: u64,
        reply: Sender<Result<()>>,
    },
    /// keep only the bytes from `offset` on
    DropPrefix {
        offset: u64,
        reply: Sender<Result<()>>,
    },
    Shutdown,
}

struct Writer {
    dir: PathBuf,
    file: File,
    sync: SyncPolicy,
    receiver: Receiver<Command>,
    failed: bool,
}

impl Writer {
    fn run(mut self) {
        let mut pending = None;
        loop {
            let command = match pending.take() {
                Some(command) => command,
                None => match self.receiver.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };
            match command {
                Command::Append {
                    record,
                    sync,
                    callback,
                } => {
                    let mut batch = vec![(record, sync, callback)];
                    while let Ok(next) = self.receiver.try_recv() {
                        match next {
                            Command::Append {
                                record,
                                sync,
                                callback,
                            } => batch.push((record, sync, callback)),
                            other => {
                                pending = Some(other);
                                break;
                            }
                        }
                    }
                    self.write_batch(batch);
                }
                Command::Truncate { offset, reply } => {
                    let result = self.guarded(|w| w.truncate(offset));
                    let _ = reply.send(result);
                }
                Command::DropPrefix { offset, reply } => {
                    let result = self.guarded(|w| w.drop_prefix(offset));
                    let _ = reply.send(result);
                }
                Command::Shutdown => break,
            }
        }
        trace!(dir = %self.dir.display(), "journal writer stopped");
    }

    /// Run `op` unless an earlier operation failed; the first failure closes the writer
    fn guarded(&mut self, op: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if self.failed {
            return Err(StorageError::WriterClosed);
        }
        let result = op(self);
        if let Err(e) = &result {
            error!(dir = %self.dir.display(), error = %e, "journal write failed, closing writer");
            self.failed = true;
        }
        result
    }

    fn write_batch(&mut self, batch: Vec<(Bytes, bool, PersistCallback)>) {
        let sync = batch.iter().any(|(_, requested, _)| self.sync.requires_sync(*requested));
        let result = self.guarded(|w| {
            for (record, _, _) in &batch {
                w.file.write_all(record)?;
            }
            if sync {
                w.file.sync_data()?;
            }
            Ok(())
        });
        trace!(records = batch.len(), sync, ok = result.is_ok(), "journal batch written");
        match result {
            Ok(()) => {
                for (_, _, callback) in batch {
                    callback(Ok(()));
                }
            }
            Err(e) => {
                for (_, _, callback) in batch {
                    callback(Err(e.duplicate()));
                }
            }
        }
    }

    fn truncate(&mut self, offset: u64) -> Result<()> {
        self.file.set_len(offset)?;
        self.file.seek(SeekFrom::Start(offset))?;
        if self.sync != SyncPolicy::Never {
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn drop_prefix(&mut self, offset: u64) -> Result<()> {
        let path = self.dir.join(JOURNAL_FILE);
        let temp_path = self.dir.join(JOURNAL_TEMP_FILE);
        let contents = fs::read(&path)?;
        let start = (offset as usize).min(contents.len());

        let mut temp = File::create(&temp_path)?;
        temp.write_all(&contents[start..])?;
        temp.sync_all()?;
        drop(temp);
        fs::rename(&temp_path, &path)?;
        atomic::sync_dir(&self.dir)?;

        self.file = open_for_append(&path)?;
        Ok(())
    }
}

fn open_for_append(path: &Path) -> Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    file.seek(SeekFrom::End(0))?;
    Ok(file)
}

// -- journal --

/// File-backed entry store
pub struct EntryJournal {
    dir: PathBuf,
    compress_threshold: usize,
    meta: JournalMeta,
    /// apply bound last written to disk; `meta.apply_to` may run ahead of it
    persisted_apply_to: LogIndex,
    /// applied entries allowed to accumulate before the apply bound is rewritten
    apply_interval: LogIndex,
    /// start offset of every record the journal still holds
    offsets: BTreeMap<LogIndex, u64>,
    end_offset: u64,
    sender: Sender<Command>,
    writer: Option<JoinHandle<()>>,
}

impl EntryJournal {
    /// Open (or create) the journal in `dir` and recover what it holds
    ///
    /// A torn or corrupt tail is cut off. Entries below `replay_from` are skipped. A hole in the
    /// remaining indices is an error: the journal cannot be trusted past it.
    pub fn open(
        dir: impl AsRef<Path>,
        sync: SyncPolicy,
        compress_threshold: usize,
    ) -> Result<(Self, RecoveredJournal)> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let meta: JournalMeta = atomic::read_json(&dir, META_FILE)?.unwrap_or_default();
        if meta.replay_from == 0 {
            return Err(StorageError::Corrupt {
                path: dir.join(META_FILE),
                reason: "replay_from must be at least 1".to_string(),
            });
        }

        let path = dir.join(JOURNAL_FILE);
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        let mut offsets = BTreeMap::new();
        let mut indices = MutableIndexSet::new();
        let mut position = 0usize;
        while position < contents.len() {
            match record::decode(&contents[position..]) {
                Ok((entry, used)) => {
                    if entry.index >= meta.replay_from {
                        if !indices.add(entry.index) {
                            return Err(StorageError::Corrupt {
                                path,
                                reason: format!("entry {} recorded twice", entry.index),
                            });
                        }
                        offsets.insert(entry.index, position as u64);
                        entries.push(entry);
                    }
                    position += used;
                }
                Err(e) => {
                    let reason = match e {
                        RecordError::Incomplete => "torn record".to_string(),
                        other => other.to_string(),
                    };
                    warn!(
                        path = %path.display(),
                        offset = position,
                        dropped = contents.len() - position,
                        %reason,
                        "truncating journal tail"
                    );
                    let file = OpenOptions::new().write(true).open(&path)?;
                    file.set_len(position as u64)?;
                    file.sync_all()?;
                    break;
                }
            }
        }

        if indices.range_count() > 1 {
            let missing = indices.ranges().next().map(|r| r.upper + 1).unwrap_or_default();
            return Err(StorageError::JournalGap { missing });
        }
        if let Some(first) = indices.first() {
            if first != meta.replay_from {
                return Err(StorageError::JournalGap {
                    missing: meta.replay_from,
                });
            }
        }
        info!(
            dir = %dir.display(),
            replay_from = meta.replay_from,
            apply_to = meta.apply_to,
            entries = entries.len(),
            "recovered journal"
        );

        let file = open_for_append(&path)?;
        let (sender, receiver) = crossbeam_channel::unbounded();
        let writer = Writer {
            dir: dir.clone(),
            file,
            sync,
            receiver,
            failed: false,
        };
        let handle = thread::Builder::new()
            .name("journal-writer".to_string())
            .spawn(move || writer.run())?;

        let recovered = RecoveredJournal {
            meta,
            entries,
            indices: indices.immutable_copy(),
        };
        let journal = Self {
            dir,
            compress_threshold,
            meta,
            persisted_apply_to: meta.apply_to,
            apply_interval: 1,
            offsets,
            end_offset: position as u64,
            sender,
            writer: Some(handle),
        };
        Ok((journal, recovered))
    }

    pub fn meta(&self) -> JournalMeta {
        self.meta
    }

    /// Rewrite the apply bound only once this many more entries have been applied
    ///
    /// A crash loses at most `interval - 1` entries of replay; the leader recommits them.
    pub fn set_apply_interval(&mut self, interval: LogIndex) {
        self.apply_interval = interval.max(1);
    }

    pub fn first_index(&self) -> Option<LogIndex> {
        self.offsets.keys().next().copied()
    }

    pub fn last_index(&self) -> Option<LogIndex> {
        self.offsets.keys().next_back().copied()
    }

    fn enqueue(&mut self, entry: LogEntry, sync: bool, callback: PersistCallback) {
        if self.offsets.contains_key(&entry.index) {
            // the caller should have truncated first; keep the file consistent anyway
            warn!(index = entry.index, "overwriting journal entry without truncation");
            if let Err(e) = self.remove_from(entry.index) {
                callback(Err(e));
                return;
            }
        }
        if let Some(last) = self.last_index() {
            if entry.index != last + 1 {
                callback(Err(StorageError::JournalGap { missing: last + 1 }));
                return;
            }
        }
        let record = match record::encode(&entry, self.compress_threshold) {
            Ok(record) => record,
            Err(e) => {
                callback(Err(e.into()));
                return;
            }
        };
        let len = record.len() as u64;
        let command = Command::Append {
            record,
            sync,
            callback,
        };
        if let Err(crossbeam_channel::SendError(command)) = self.sender.send(command) {
            if let Command::Append { callback, .. } = command {
                callback(Err(StorageError::WriterClosed));
            }
            return;
        }
        self.offsets.insert(entry.index, self.end_offset);
        self.end_offset += len;
    }

    /// Send a command that carries a reply channel and wait for the writer's answer
    fn request(&self, command: impl FnOnce(Sender<Result<()>>) -> Command) -> Result<()> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.sender
            .send(command(reply))
            .map_err(|_| StorageError::WriterClosed)?;
        response.recv().map_err(|_| StorageError::WriterClosed)?
    }

    fn store_meta(&mut self, meta: JournalMeta) -> Result<()> {
        atomic::write_json(&self.dir, META_FILE, &meta)?;
        self.meta = meta;
        self.persisted_apply_to = meta.apply_to;
        Ok(())
    }
}

impl EntryStore for EntryJournal {
    fn persist(&mut self, entry: LogEntry, callback: PersistCallback) {
        self.enqueue(entry, false, callback);
    }

    fn persist_and_sync(&mut self, entry: LogEntry, callback: PersistCallback) {
        self.enqueue(entry, true, callback);
    }

    fn remove_from(&mut self, from: LogIndex) -> Result<()> {
        let Some(&offset) = self.offsets.range(from..).next().map(|(_, offset)| offset) else {
            return Ok(());
        };
        self.request(|reply| Command::Truncate { offset, reply })?;
        let removed = self.offsets.split_off(&from).len();
        self.end_offset = offset;
        debug!(from, removed, "truncated journal suffix");
        Ok(())
    }

    fn compact_to(&mut self, meta: EntryMeta) -> Result<()> {
        if meta.index < self.meta.replay_from {
            return Ok(());
        }
        // recovery skips everything below replay_from, so the prefix is logically gone once this lands
        self.store_meta(JournalMeta {
            replay_from: meta.index + 1,
            apply_to: self.meta.apply_to.max(meta.index),
        })?;

        let offset = self
            .offsets
            .range(meta.index + 1..)
            .next()
            .map(|(_, offset)| *offset)
            .unwrap_or(self.end_offset);
        if offset == 0 {
            return Ok(());
        }
        self.request(|reply| Command::DropPrefix { offset, reply })?;

        let kept = self.offsets.split_off(&(meta.index + 1));
        let removed = self.offsets.len();
        self.offsets = kept.into_iter().map(|(index, o)| (index, o - offset)).collect();
        self.end_offset -= offset;
        debug!(up_to = %meta, removed, "compacted journal prefix");
        Ok(())
    }

    fn apply_to(&mut self, index: LogIndex) -> Result<()> {
        if index <= self.meta.apply_to {
            return Ok(());
        }
        if index - self.persisted_apply_to < self.apply_interval {
            self.meta.apply_to = index;
            return Ok(());
        }
        self.store_meta(JournalMeta {
            apply_to: index,
            ..self.meta
        })
    }
}

impl Drop for EntryJournal {
    fn drop(&mut self) {
        if self.meta.apply_to > self.persisted_apply_to {
            if let Err(e) = atomic::write_json(&self.dir, META_FILE, &self.meta) {
                warn!(dir = %self.dir.display(), error = %e, "could not record apply bound at shutdown");
            }
        }
        let _ = self.sender.send(Command::Shutdown);
        if let Some(handle) = self.writer.take() {
            if handle.join().is_err() {
                error!(dir = %self.dir.display(), "journal writer panicked");
            }
        }
    }
}

// -- in memory --

/// Entry store for members running without durable storage; every callback fires at once
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: BTreeMap<LogIndex, LogEntry>,
    meta: JournalMeta,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.values()
    }

    pub fn meta(&self) -> JournalMeta {
        self.meta
    }
}

impl EntryStore for MemoryEntryStore {
    fn persist(&mut self, entry: LogEntry, callback: PersistCallback) {
        self.entries.split_off(&entry.index);
        self.entries.insert(entry.index, entry);
        callback(Ok(()));
    }

    fn persist_and_sync(&mut self, entry: LogEntry, callback: PersistCallback) {
        self.persist(entry, callback);
    }

    fn remove_from(&mut self, from: LogIndex) -> Result<()> {
        self.entries.split_off(&from);
        Ok(())
    }

    fn compact_to(&mut self, meta: EntryMeta) -> Result<()> {
        self.entries = self.entries.split_off(&(meta.index + 1));
        self.meta.replay_from = self.meta.replay_from.max(meta.index + 1);
        self.meta.apply_to = self.meta.apply_to.max(meta.index);
        Ok(())
    }

    fn apply_to(&mut self, index: LogIndex) -> Result<()> {
        self.meta.apply_to = self.meta.apply_to.max(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn entry(index: LogIndex, term: u64) -> LogEntry {
        LogEntry::new(term, index, format!("cmd-{index}").into_bytes())
    }

    /// Persist `entries` and wait for every callback
    fn persist_all(store: &mut dyn EntryStore, entries: impl IntoIterator<Item = LogEntry>) -> Vec<Result<()>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut count = 0;
        for entry in entries {
            let tx = tx.clone();
            store.persist_and_sync(entry, Box::new(move |result: Result<()>| {
                let _ = tx.send(result);
            }));
            count += 1;
        }
        (0..count).map(|_| rx.recv().unwrap()).collect()
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let (mut journal, recovered) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
            assert!(recovered.entries.is_empty());
            let results = persist_all(&mut journal, (1..=5).map(|i| entry(i, 1)));
            assert!(results.iter().all(|r| r.is_ok()));
        }
        let (journal, recovered) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
        assert_eq!(recovered.entries, (1..=5).map(|i| entry(i, 1)).collect::<Vec<_>>());
        assert_eq!(recovered.indices.range_count(), 1);
        assert_eq!(journal.last_index(), Some(5));
    }

    #[test]
    fn callbacks_fire_in_append_order() {
        let dir = TempDir::new().unwrap();
        let (mut journal, _) = EntryJournal::open(dir.path(), SyncPolicy::OnRequest, 0).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 1..=20 {
            let order = order.clone();
            let tx = tx.clone();
            journal.persist(entry(i, 1), Box::new(move |result: Result<()>| {
                result.unwrap();
                order.lock().unwrap().push(i);
                let _ = tx.send(());
            }));
        }
        for _ in 0..20 {
            rx.recv().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn remove_from_truncates_suffix() {
        let dir = TempDir::new().unwrap();
        {
            let (mut journal, _) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
            persist_all(&mut journal, (1..=10).map(|i| entry(i, 2)));
            journal.remove_from(8).unwrap();
            persist_all(&mut journal, (8..=9).map(|i| entry(i, 3)));
        }
        let (_, recovered) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
        let metas: Vec<_> = recovered.entries.iter().map(|e| (e.index, e.term)).collect();
        assert_eq!(metas.last(), Some(&(9, 3)));
        assert_eq!(metas.len(), 9);
        assert_eq!(metas[6], (7, 2));
    }

    #[test]
    fn compaction_drops_prefix_and_moves_replay_start() {
        let dir = TempDir::new().unwrap();
        {
            let (mut journal, _) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
            persist_all(&mut journal, (1..=10).map(|i| entry(i, 1)));
            journal.compact_to(EntryMeta::new(6, 1)).unwrap();
            assert_eq!(journal.first_index(), Some(7));
            persist_all(&mut journal, [entry(11, 1)]);
            journal.remove_from(10).unwrap();
        }
        let (_, recovered) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
        assert_eq!(recovered.meta.replay_from, 7);
        let indices: Vec<_> = recovered.entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![7, 8, 9]);
    }

    #[test]
    fn torn_tail_is_cut_off() {
        let dir = TempDir::new().unwrap();
        {
            let (mut journal, _) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
            persist_all(&mut journal, (1..=3).map(|i| entry(i, 1)));
        }
        let path = dir.path().join(JOURNAL_FILE);
        let mut bytes = fs::read(&path).unwrap();
        let full = bytes.len();
        bytes.extend_from_slice(&record::encode(&entry(4, 1), 0).unwrap()[..10]);
        fs::write(&path, &bytes).unwrap();

        let (mut journal, recovered) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
        assert_eq!(recovered.entries.len(), 3);
        assert_eq!(fs::metadata(&path).unwrap().len() as usize, full);

        // appends continue cleanly after the cut
        assert!(persist_all(&mut journal, [entry(4, 1)])[0].is_ok());
        drop(journal);
        let (_, recovered) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
        assert_eq!(recovered.entries.len(), 4);
    }

    #[test]
    fn apply_bound_is_written_in_intervals() {
        let dir = TempDir::new().unwrap();
        let on_disk = |dir: &TempDir| -> LogIndex {
            atomic::read_json::<JournalMeta>(dir.path(), META_FILE)
                .unwrap()
                .map_or(0, |meta| meta.apply_to)
        };
        {
            let (mut journal, _) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
            journal.set_apply_interval(4);
            journal.apply_to(3).unwrap();
            assert_eq!(journal.meta().apply_to, 3);
            assert_eq!(on_disk(&dir), 0);
            journal.apply_to(5).unwrap();
            assert_eq!(on_disk(&dir), 5);
            journal.apply_to(6).unwrap();
            assert_eq!(on_disk(&dir), 5);
        }
        assert_eq!(on_disk(&dir), 6);
        let (_, recovered) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
        assert_eq!(recovered.meta.apply_to, 6);
    }

    #[test]
    fn apply_to_is_recorded() {
        let dir = TempDir::new().unwrap();
        {
            let (mut journal, _) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
            persist_all(&mut journal, (1..=4).map(|i| entry(i, 1)));
            journal.apply_to(3).unwrap();
            journal.apply_to(2).unwrap();
        }
        let (_, recovered) = EntryJournal::open(dir.path(), SyncPolicy::Always, 0).unwrap();
        assert_eq!(recovered.meta.apply_to, 3);
    }

    #[test]
    fn non_contiguous_append_is_refused() {
        let dir = TempDir::new().unwrap();
        let (mut journal, _) = EntryJournal::open(dir.path(), SyncPolicy::Never, 0).unwrap();
        persist_all(&mut journal, [entry(1, 1)]);
        let results = persist_all(&mut journal, [entry(3, 1)]);
        assert!(matches!(results[0], Err(StorageError::JournalGap { missing: 2 })));
    }

    #[test]
    fn memory_store_tracks_entries() {
        let mut store = MemoryEntryStore::new();
        persist_all(&mut store, (1..=6).map(|i| entry(i, 1)));
        store.remove_from(5).unwrap();
        store.compact_to(EntryMeta::new(2, 1)).unwrap();
        let indices: Vec<_> = store.entries().map(|e| e.index).collect();
        assert_eq!(indices, vec![3, 4]);
        assert_eq!(store.meta().replay_from, 3);
    }
}
