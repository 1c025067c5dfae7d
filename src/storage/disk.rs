//! File-backed stores for RecStore
//!
//! Each table owns one append-only log file, `<data_dir>/<table>.db`, made of
//! checksummed frames:
//!
//! ```text
//! frame:   crc32: u32 LE | payload_len: u32 LE | payload
//! payload: tag: u8 (1 = set, 2 = delete)
//!          key_len: u32 LE | key bytes
//!          value_len: u32 LE | value bytes   (set only)
//! ```
//!
//! Opening a store replays the log into an index of value offsets, so a key
//! lookup reads one value from disk. The backend keeps each index between
//! opens and reuses it while the file's length and modification time are
//! unchanged. Closing compacts the log once it has accumulated enough
//! overwritten or deleted entries.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::{debug, warn};

use super::store::{KvStore, StorageBackend};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

const TAG_SET: u8 = 1;
const TAG_DELETE: u8 = 2;

/// crc32 + payload length
const FRAME_HEADER_LEN: usize = 8;

/// Store file extension
const STORE_EXTENSION: &str = "db";

/// A single log entry
#[derive(Debug, Clone, PartialEq)]
enum LogEntry {
    Set { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl LogEntry {
    fn payload(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        match self {
            LogEntry::Set { key, value } => {
                bytes.push(TAG_SET);
                write_blob(&mut bytes, key)?;
                write_blob(&mut bytes, value)?;
            }
            LogEntry::Delete { key } => {
                bytes.push(TAG_DELETE);
                write_blob(&mut bytes, key)?;
            }
        }
        Ok(bytes)
    }

    /// Encode as a checksummed frame
    fn to_frame(&self) -> Result<Vec<u8>> {
        let payload = self.payload()?;
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        frame.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
        frame.write_u32::<LittleEndian>(frame_len(payload.len())?)?;
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decode a payload whose checksum already matched
    fn decode(payload: &[u8]) -> io::Result<LogEntry> {
        let mut cursor = Cursor::new(payload);
        let entry = match cursor.read_u8()? {
            TAG_SET => {
                let key = read_blob(&mut cursor)?;
                let value = read_blob(&mut cursor)?;
                LogEntry::Set { key, value }
            }
            TAG_DELETE => LogEntry::Delete {
                key: read_blob(&mut cursor)?,
            },
            tag => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown entry tag {}", tag),
                ))
            }
        };
        if cursor.position() as usize != payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "trailing bytes after entry",
            ));
        }
        Ok(entry)
    }

    /// Offset of a set entry's value from the start of its frame
    fn value_offset(key_len: usize) -> u64 {
        (FRAME_HEADER_LEN + 1 + 4 + key_len + 4) as u64
    }
}

/// Lengths are stored as u32
fn frame_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::EntryTooLarge(len))
}

fn write_blob(bytes: &mut Vec<u8>, blob: &[u8]) -> Result<()> {
    bytes.write_u32::<LittleEndian>(frame_len(blob.len())?)?;
    bytes.extend_from_slice(blob);
    Ok(())
}

fn read_blob(cursor: &mut Cursor<&[u8]>) -> io::Result<Vec<u8>> {
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("blob length {} exceeds the {} bytes left in the entry", len, remaining),
        ));
    }
    let mut blob = vec![0u8; len];
    cursor.read_exact(&mut blob)?;
    Ok(blob)
}

/// Where a live value sits in the log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ValueRef {
    offset: u64,
    len: usize,
}

/// Replayed state of one log file
#[derive(Debug, Default)]
struct LogIndex {
    /// Live keys in insertion order
    entries: IndexMap<Vec<u8>, ValueRef>,
    /// Number of frames in the log
    log_entries: usize,
    /// Length of the valid log
    file_len: u64,
}

/// Replay a log, stopping at a torn tail. `file_len` of the result is the
/// length of the valid prefix.
fn replay(name: &str, buf: &[u8]) -> Result<LogIndex> {
    let mut index = LogIndex::default();
    let mut pos = 0usize;

    while pos < buf.len() {
        let rest = &buf[pos..];
        if rest.len() < FRAME_HEADER_LEN {
            break;
        }
        let crc = LittleEndian::read_u32(&rest[0..4]);
        let len = LittleEndian::read_u32(&rest[4..8]) as usize;
        let Some(payload) = rest.get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len) else {
            // intact entries after this header mean its length field is damaged
            if contains_frame(&rest[FRAME_HEADER_LEN..]) {
                return Err(Error::CorruptedStore(
                    name.to_string(),
                    format!("entry at offset {} runs past the end of the file", pos),
                ));
            }
            break;
        };
        let end = pos + FRAME_HEADER_LEN + len;

        if len == 0 || crc32fast::hash(payload) != crc {
            if end == buf.len() || rest.iter().all(|&b| b == 0) {
                break;
            }
            return Err(Error::CorruptedStore(
                name.to_string(),
                format!("checksum mismatch in entry at offset {}", pos),
            ));
        }

        let entry = LogEntry::decode(payload).map_err(|e| {
            Error::CorruptedStore(name.to_string(), format!("entry at offset {}: {}", pos, e))
        })?;
        match entry {
            LogEntry::Set { key, value } => {
                let value_ref = ValueRef {
                    offset: pos as u64 + LogEntry::value_offset(key.len()),
                    len: value.len(),
                };
                index.entries.insert(key, value_ref);
            }
            LogEntry::Delete { key } => {
                index.entries.shift_remove(&key);
            }
        }
        index.log_entries += 1;
        pos = end;
    }

    index.file_len = pos as u64;
    Ok(index)
}

/// Whether a complete frame with a matching checksum starts anywhere in `bytes`
fn contains_frame(bytes: &[u8]) -> bool {
    bytes
        .windows(FRAME_HEADER_LEN)
        .enumerate()
        .any(|(start, header)| {
            let crc = LittleEndian::read_u32(&header[0..4]);
            let len = LittleEndian::read_u32(&header[4..8]) as usize;
            let from = start + FRAME_HEADER_LEN;
            len > 0
                && bytes
                    .get(from..from + len)
                    .map_or(false, |payload| crc32fast::hash(payload) == crc)
        })
}

/// An index left behind by a closed store
#[derive(Debug)]
struct CachedIndex {
    index: LogIndex,
    modified: Option<SystemTime>,
}

type IndexCache = Arc<Mutex<HashMap<String, CachedIndex>>>;

fn lock_cache(cache: &IndexCache) -> Result<MutexGuard<'_, HashMap<String, CachedIndex>>> {
    cache
        .lock()
        .map_err(|_| Error::Internal("store index cache lock poisoned".to_string()))
}

/// Creates file-backed stores inside a data directory
#[derive(Debug, Clone)]
pub struct FileBackend {
    /// Directory where store files live
    data_dir: PathBuf,
    /// fsync after every write
    sync_writes: bool,
    compaction_ratio: usize,
    compaction_min_entries: usize,
    cache: IndexCache,
}

impl FileBackend {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            sync_writes: config.sync_writes,
            compaction_ratio: config.compaction_ratio.max(1),
            compaction_min_entries: config.compaction_min_entries,
            cache: IndexCache::default(),
        }
    }

    /// Path of the store file for a table
    fn store_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.{}", name, STORE_EXTENSION))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.{}.tmp", name, STORE_EXTENSION))
    }

    #[cfg(test)]
    fn is_cached(&self, name: &str) -> bool {
        lock_cache(&self.cache)
            .map(|cache| cache.contains_key(name))
            .unwrap_or(false)
    }
}

impl StorageBackend for FileBackend {
    fn open(&self, name: &str) -> Result<Box<dyn KvStore>> {
        fs::create_dir_all(&self.data_dir)?;
        let store = FileStore::open(name, self)?;
        Ok(Box::new(store))
    }

    fn destroy(&self, name: &str) -> Result<()> {
        // the log goes last so a failure leaves the data readable
        for path in [self.temp_path(name), self.store_path(name)] {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed store file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        lock_cache(&self.cache)?.remove(name);
        Ok(())
    }
}

/// An open file-backed store
#[derive(Debug)]
pub struct FileStore {
    name: String,
    path: PathBuf,
    temp_path: PathBuf,
    /// Opened for reading and appending
    file: File,
    index: LogIndex,
    sync_writes: bool,
    compaction_ratio: usize,
    compaction_min_entries: usize,
    cache: IndexCache,
}

impl FileStore {
    fn open(name: &str, backend: &FileBackend) -> Result<Self> {
        let path = backend.store_path(name);
        let file = open_log(&path)?;
        let metadata = file.metadata()?;
        let modified = metadata.modified().ok();

        let cached = lock_cache(&backend.cache)?.remove(name);
        let index = match cached {
            Some(cached)
                if modified.is_some()
                    && cached.modified == modified
                    && cached.index.file_len == metadata.len() =>
            {
                debug!(store = name, "reusing cached store index");
                cached.index
            }
            _ => Self::load(name, &file)?,
        };

        Ok(Self {
            name: name.to_string(),
            path,
            temp_path: backend.temp_path(name),
            file,
            index,
            sync_writes: backend.sync_writes,
            compaction_ratio: backend.compaction_ratio,
            compaction_min_entries: backend.compaction_min_entries,
            cache: backend.cache.clone(),
        })
    }

    /// Replay the whole file, cutting off a torn tail
    fn load(name: &str, file: &File) -> Result<LogIndex> {
        let mut buf = Vec::new();
        let mut reader = file;
        reader.seek(SeekFrom::Start(0))?;
        reader.read_to_end(&mut buf)?;

        let index = replay(name, &buf)?;
        if index.file_len < buf.len() as u64 {
            warn!(
                store = name,
                offset = index.file_len,
                discarded = buf.len() as u64 - index.file_len,
                "discarding torn entry at end of store file"
            );
            file.set_len(index.file_len)?;
        }
        debug!(store = name, live = index.entries.len(), "replayed store log");
        Ok(index)
    }

    /// Append a frame, returning the offset it was written at
    fn append(&mut self, frame: &[u8]) -> Result<u64> {
        let offset = self.index.file_len;
        if let Err(e) = self.file.write_all(frame).and_then(|_| self.file.flush()) {
            // drop a partial frame so later appends stay aligned
            let _ = self.file.set_len(offset);
            return Err(e.into());
        }
        if self.sync_writes {
            self.file.sync_data()?;
        }
        self.index.file_len += frame.len() as u64;
        self.index.log_entries += 1;
        Ok(offset)
    }

    fn read_value(&self, at: ValueRef) -> Result<Vec<u8>> {
        let mut reader = &self.file;
        reader.seek(SeekFrom::Start(at.offset))?;
        let mut value = vec![0u8; at.len];
        reader.read_exact(&mut value)?;
        Ok(value)
    }

    fn needs_compaction(&self) -> bool {
        let log_entries = self.index.log_entries;
        log_entries >= self.compaction_min_entries
            && log_entries > self.compaction_ratio * self.index.entries.len().max(1)
    }

    /// Rewrite the log with one set entry per live key
    fn compact(&mut self) -> Result<()> {
        let values = self.values()?;
        let mut bytes = Vec::new();
        let mut entries = IndexMap::with_capacity(values.len());

        for (key, value) in self.index.entries.keys().zip(values) {
            let value_ref = ValueRef {
                offset: bytes.len() as u64 + LogEntry::value_offset(key.len()),
                len: value.len(),
            };
            bytes.extend(
                LogEntry::Set {
                    key: key.clone(),
                    value,
                }
                .to_frame()?,
            );
            entries.insert(key.clone(), value_ref);
        }

        {
            let mut tmp = File::create(&self.temp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&self.temp_path, &self.path)?;
        self.file = open_log(&self.path)?;

        debug!(
            store = %self.name,
            before = self.index.log_entries,
            after = entries.len(),
            "compacted store log"
        );
        self.index = LogIndex {
            log_entries: entries.len(),
            file_len: bytes.len() as u64,
            entries,
        };
        Ok(())
    }
}

fn open_log(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?)
}

impl KvStore for FileStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.index.entries.get(key) {
            Some(at) => self.read_value(*at).map(Some),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let frame = LogEntry::Set {
            key: key.to_vec(),
            value: value.to_vec(),
        }
        .to_frame()?;
        let offset = self.append(&frame)?;
        self.index.entries.insert(
            key.to_vec(),
            ValueRef {
                offset: offset + LogEntry::value_offset(key.len()),
                len: value.len(),
            },
        );
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool> {
        if !self.index.entries.contains_key(key) {
            return Ok(false);
        }
        let frame = LogEntry::Delete { key: key.to_vec() }.to_frame()?;
        self.append(&frame)?;
        self.index.entries.shift_remove(key);
        Ok(true)
    }

    fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.index.entries.contains_key(key))
    }

    fn values(&self) -> Result<Vec<Vec<u8>>> {
        let mut buf = Vec::new();
        let mut reader = &self.file;
        reader.seek(SeekFrom::Start(0))?;
        reader.read_to_end(&mut buf)?;

        self.index
            .entries
            .values()
            .map(|at| {
                let start = at.offset as usize;
                buf.get(start..start + at.len)
                    .map(|value| value.to_vec())
                    .ok_or_else(|| {
                        Error::CorruptedStore(
                            self.name.clone(),
                            format!("value at offset {} lies past the end of the file", start),
                        )
                    })
            })
            .collect()
    }

    fn count(&self) -> Result<usize> {
        Ok(self.index.entries.len())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        if self.needs_compaction() {
            self.compact()?;
        } else if self.sync_writes {
            self.file.sync_all()?;
        }

        let modified = self.file.metadata()?.modified().ok();
        let store = *self;
        lock_cache(&store.cache)?.insert(
            store.name,
            CachedIndex {
                index: store.index,
                modified,
            },
        );
        Ok(())
    }
}
