//! # snapshot
//!
//! why: let the log be compacted behind durable point-in-time copies of the application state
//! relations: RaftStorage saves through SnapshotStore; recovery restores from SnapshotSource
//! what: SnapshotSource (Plain | Lz4 | Delegated), OpenStream, SnapshotFile, SnapshotStore,
//!       FileSnapshotStore, MemorySnapshotStore

use crate::atomic;
use crate::config::CompressionType;
use crate::error::{Result, StorageError};
use bytes::Bytes;
use raft_core::SnapshotMeta;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SNAPSHOT_PREFIX: &str = "snapshot-";
const TEMP_SUFFIX: &str = ".tmp";

/// Anything that can hand out a fresh reader over snapshot bytes
pub trait OpenStream: Send + Sync + fmt::Debug {
    fn open_stream(&self) -> io::Result<Box<dyn Read>>;
}

impl OpenStream for Bytes {
    fn open_stream(&self) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(Cursor::new(self.clone())))
    }
}

/// Where the bytes of a snapshot live
///
/// Every variant yields the uncompressed application state from `open_stream`. A missing or
/// damaged backing resource shows up as an i/o error, either when opening or while reading.
#[derive(Debug, Clone)]
pub enum SnapshotSource {
    /// raw bytes in a file
    Plain { path: PathBuf },
    /// lz4 frame with content checksum
    Lz4 { path: PathBuf },
    /// bytes served by someone else, e.g. kept in memory
    Delegated(Arc<dyn OpenStream>),
}

impl SnapshotSource {
    pub fn delegated(inner: impl OpenStream + 'static) -> Self {
        SnapshotSource::Delegated(Arc::new(inner))
    }

    pub fn in_memory(data: impl Into<Bytes>) -> Self {
        Self::delegated(data.into())
    }

    pub fn open_stream(&self) -> io::Result<Box<dyn Read>> {
        match self {
            SnapshotSource::Plain { path } => Ok(Box::new(BufReader::new(File::open(path)?))),
            SnapshotSource::Lz4 { path } => {
                let decoder = lz4::Decoder::new(BufReader::new(File::open(path)?))?;
                Ok(Box::new(decoder))
            }
            SnapshotSource::Delegated(inner) => inner.open_stream(),
        }
    }

    /// Read the whole snapshot into memory
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.open_stream()?.read_to_end(&mut data)?;
        Ok(data)
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            SnapshotSource::Plain { path } | SnapshotSource::Lz4 { path } => Some(path),
            SnapshotSource::Delegated(_) => None,
        }
    }
}

impl OpenStream for SnapshotSource {
    fn open_stream(&self) -> io::Result<Box<dyn Read>> {
        SnapshotSource::open_stream(self)
    }
}

/// A stored snapshot: its boundary and where to read it from
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    pub meta: SnapshotMeta,
    pub source: SnapshotSource,
}

/// Persisted snapshots of one member
pub trait SnapshotStore: Send {
    /// Durably store a snapshot; it is visible through `last`/`list` once this returns
    fn save(&mut self, meta: SnapshotMeta, data: &[u8]) -> Result<SnapshotFile>;

    /// Every stored snapshot, oldest first
    fn list(&self) -> Vec<SnapshotFile>;

    /// The newest stored snapshot
    fn last(&self) -> Option<SnapshotFile> {
        self.list().pop()
    }

    /// Delete every snapshot `filter` selects; returns how many went away
    ///
    /// Best effort: a snapshot that cannot be deleted is logged and skipped.
    fn delete_snapshots(&mut self, filter: &dyn Fn(&SnapshotMeta) -> bool) -> usize;
}

// -- file backed --

/// Snapshots stored as `snapshot-<index>-<term>.<plain|lz4>` in one directory
pub struct FileSnapshotStore {
    dir: PathBuf,
    compression: CompressionType,
    snapshots: Vec<SnapshotFile>,
}

impl FileSnapshotStore {
    /// Open the store, listing what is already on disk and clearing leftover temp files
    pub fn open(dir: impl AsRef<Path>, compression: CompressionType) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut snapshots = Vec::new();
        for dirent in fs::read_dir(&dir)? {
            let path = dirent?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(TEMP_SUFFIX) {
                debug!(path = %path.display(), "removing unfinished snapshot");
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to remove unfinished snapshot");
                }
                continue;
            }
            match parse_file_name(name) {
                Some((meta, CompressionType::None)) => snapshots.push(SnapshotFile {
                    meta,
                    source: SnapshotSource::Plain { path },
                }),
                Some((meta, CompressionType::Lz4)) => snapshots.push(SnapshotFile {
                    meta,
                    source: SnapshotSource::Lz4 { path },
                }),
                None => {}
            }
        }
        snapshots.sort_by_key(|s| (s.meta.last_included_index, s.meta.last_included_term));
        debug!(dir = %dir.display(), count = snapshots.len(), "opened snapshot store");
        Ok(Self {
            dir,
            compression,
            snapshots,
        })
    }

    fn write_plain(path: &Path, data: &[u8]) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(data)?;
        file.sync_all()
    }

    fn write_lz4(path: &Path, data: &[u8]) -> io::Result<()> {
        let file = File::create(path)?;
        let mut encoder = lz4::EncoderBuilder::new()
            .checksum(lz4::ContentChecksum::ChecksumEnabled)
            .build(file)?;
        encoder.write_all(data)?;
        let (file, result) = encoder.finish();
        result?;
        file.sync_all()
    }
}

fn file_name(meta: &SnapshotMeta, compression: CompressionType) -> String {
    format!(
        "{SNAPSHOT_PREFIX}{}-{}.{}",
        meta.last_included_index,
        meta.last_included_term,
        compression.extension()
    )
}

fn parse_file_name(name: &str) -> Option<(SnapshotMeta, CompressionType)> {
    let rest = name.strip_prefix(SNAPSHOT_PREFIX)?;
    let (stem, extension) = rest.rsplit_once('.')?;
    let compression = match extension {
        "plain" => CompressionType::None,
        "lz4" => CompressionType::Lz4,
        _ => return None,
    };
    let (index, term) = stem.split_once('-')?;
    Some((SnapshotMeta::new(index.parse().ok()?, term.parse().ok()?), compression))
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&mut self, meta: SnapshotMeta, data: &[u8]) -> Result<SnapshotFile> {
        let name = file_name(&meta, self.compression);
        let path = self.dir.join(&name);
        let temp_path = self.dir.join(format!("{name}{TEMP_SUFFIX}"));
        match self.compression {
            CompressionType::None => Self::write_plain(&temp_path, data)?,
            CompressionType::Lz4 => Self::write_lz4(&temp_path, data)?,
        }
        fs::rename(&temp_path, &path)?;
        atomic::sync_dir(&self.dir)?;

        let source = match self.compression {
            CompressionType::None => SnapshotSource::Plain { path },
            CompressionType::Lz4 => SnapshotSource::Lz4 { path },
        };
        let saved = SnapshotFile { meta, source };
        self.snapshots.retain(|s| s.meta != meta);
        self.snapshots.push(saved.clone());
        self.snapshots
            .sort_by_key(|s| (s.meta.last_included_index, s.meta.last_included_term));
        info!(snapshot = %meta.last_included(), bytes = data.len(), "saved snapshot");
        Ok(saved)
    }

    fn list(&self) -> Vec<SnapshotFile> {
        self.snapshots.clone()
    }

    fn delete_snapshots(&mut self, filter: &dyn Fn(&SnapshotMeta) -> bool) -> usize {
        let mut deleted = 0;
        self.snapshots.retain(|snapshot| {
            if !filter(&snapshot.meta) {
                return true;
            }
            let Some(path) = snapshot.source.path() else {
                return true;
            };
            match fs::remove_file(path) {
                Ok(()) => {
                    deleted += 1;
                    false
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to delete snapshot");
                    true
                }
            }
        });
        if deleted > 0 {
            debug!(deleted, "deleted snapshots");
        }
        deleted
    }
}

// -- in memory --

/// Snapshots held as shared byte buffers
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Vec<SnapshotFile>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&mut self, meta: SnapshotMeta, data: &[u8]) -> Result<SnapshotFile> {
        let saved = SnapshotFile {
            meta,
            source: SnapshotSource::in_memory(Bytes::copy_from_slice(data)),
        };
        self.snapshots.retain(|s| s.meta != meta);
        self.snapshots.push(saved.clone());
        self.snapshots
            .sort_by_key(|s| (s.meta.last_included_index, s.meta.last_included_term));
        Ok(saved)
    }

    fn list(&self) -> Vec<SnapshotFile> {
        self.snapshots.clone()
    }

    fn delete_snapshots(&mut self, filter: &dyn Fn(&SnapshotMeta) -> bool) -> usize {
        let before = self.snapshots.len();
        self.snapshots.retain(|s| !filter(&s.meta));
        before - self.snapshots.len()
    }
}

/// Read a stored snapshot fully, mapping a missing file to `SnapshotNotFound`
pub fn load(snapshot: &SnapshotFile) -> Result<Vec<u8>> {
    snapshot.source.read_all().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StorageError::SnapshotNotFound,
        _ => StorageError::Io(e),
    })
}
