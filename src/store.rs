//! Persistent sorted key/value tables backing the title indexes.
//!
//! ```text
//! [magic "WSKV" | version u8 | value kind u8 | reserved 2B]
//! [entry]...            key: varint len + UTF-8, value: kind-specific
//! [meta]                bincode: entry count, data region, sparse index
//! [meta_offset u64 | meta_len u64 | crc32(meta) u32 | magic "WSKV"]
//! ```
//!
//! Entries are sorted by key bytes. The sparse index keeps every
//! `SPARSE_INDEX_INTERVAL`th key with its offset, so a lookup reads one
//! block of at most that many entries.

use crate::codec::{read_str, read_uvarint, write_str, write_uvarint};
use crate::config::{READ_BUFFER_SIZE, SPARSE_INDEX_INTERVAL, STORE_MAGIC, STORE_VERSION, WRITE_BUFFER_SIZE};
use crate::error::IndexError;
use bincode::Options;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

const HEADER_LEN: u64 = 8;
const FOOTER_LEN: u64 = 24;

/// Values a sorted table can hold.
pub trait StoreValue: Sized {
    const KIND: u8;

    fn encode(&self, out: &mut Vec<u8>) -> io::Result<()>;
    fn decode<R: Read>(r: R) -> io::Result<Self>;
}

impl StoreValue for u64 {
    const KIND: u8 = 1;

    fn encode(&self, out: &mut Vec<u8>) -> io::Result<()> {
        write_uvarint(out, *self)
    }

    fn decode<R: Read>(r: R) -> io::Result<Self> {
        read_uvarint(r)
    }
}

impl StoreValue for String {
    const KIND: u8 = 2;

    fn encode(&self, out: &mut Vec<u8>) -> io::Result<()> {
        write_str(out, self)
    }

    fn decode<R: Read>(r: R) -> io::Result<Self> {
        read_str(r)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreMeta {
    entry_count: u64,
    data_end: u64,
    sparse: Vec<(String, u64)>,
}

fn corrupt(path: &Path, reason: impl Into<String>) -> IndexError {
    IndexError::CorruptStore {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Writes `entries`, which must already be sorted by key, to `path`.
///
/// The table is written to a temporary sibling and renamed into place, so a
/// reader never observes a half-written table.
pub fn write_store<'a, V, I>(path: &Path, entries: I) -> Result<u64, IndexError>
where
    V: StoreValue + 'a,
    I: IntoIterator<Item = (&'a String, &'a V)>,
{
    let tmp_path = path.with_extension("idx.tmp");
    let file = File::create(&tmp_path)?;
    let mut out = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

    let mut header = [0u8; HEADER_LEN as usize];
    header[0..4].copy_from_slice(&STORE_MAGIC);
    header[4] = STORE_VERSION;
    header[5] = V::KIND;
    out.write_all(&header)?;

    let mut position = HEADER_LEN;
    let mut sparse = Vec::new();
    let mut entry_count: u64 = 0;
    let mut buf = Vec::with_capacity(256);
    let mut prev: Option<&String> = None;

    for (key, value) in entries {
        if let Some(p) = prev {
            if p.as_bytes() >= key.as_bytes() {
                return Err(corrupt(path, format!("keys out of order at '{}'", key)));
            }
        }
        if entry_count % SPARSE_INDEX_INTERVAL as u64 == 0 {
            sparse.push((key.clone(), position));
        }
        buf.clear();
        write_str(&mut buf, key)?;
        value.encode(&mut buf)?;
        out.write_all(&buf)?;
        position += buf.len() as u64;
        entry_count += 1;
        prev = Some(key);
    }

    let meta = StoreMeta {
        entry_count,
        data_end: position,
        sparse,
    };
    let meta_bytes = bincode::options()
        .serialize(&meta)
        .map_err(|e| corrupt(path, format!("failed to encode metadata: {}", e)))?;
    out.write_all(&meta_bytes)?;

    let mut footer = [0u8; FOOTER_LEN as usize];
    footer[0..8].copy_from_slice(&position.to_le_bytes());
    footer[8..16].copy_from_slice(&(meta_bytes.len() as u64).to_le_bytes());
    footer[16..20].copy_from_slice(&crc32fast::hash(&meta_bytes).to_le_bytes());
    footer[20..24].copy_from_slice(&STORE_MAGIC);
    out.write_all(&footer)?;

    out.flush()?;
    out.get_ref().sync_all()?;
    drop(out);
    fs::rename(&tmp_path, path)?;

    debug!(path = ?path, entries = entry_count, "Sorted table written");
    Ok(entry_count)
}

/// Read handle on a sorted table. Each handle owns its file cursor.
pub struct StoreReader<V> {
    path: PathBuf,
    file: BufReader<File>,
    meta: StoreMeta,
    block: Option<(usize, Vec<u8>)>,
    _value: PhantomData<V>,
}

impl<V: StoreValue> StoreReader<V> {
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_LEN + FOOTER_LEN {
            return Err(corrupt(path, "file too small"));
        }

        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)?;
        if header[0..4] != STORE_MAGIC {
            return Err(corrupt(path, "bad magic"));
        }
        if header[4] == 0 || header[4] > STORE_VERSION {
            return Err(IndexError::UnsupportedStore {
                path: path.display().to_string(),
                reason: format!("version {} (supported: {})", header[4], STORE_VERSION),
            });
        }
        if header[5] != V::KIND {
            return Err(IndexError::UnsupportedStore {
                path: path.display().to_string(),
                reason: format!("value kind {}, expected {}", header[5], V::KIND),
            });
        }

        file.seek(SeekFrom::Start(file_len - FOOTER_LEN))?;
        let mut footer = [0u8; FOOTER_LEN as usize];
        file.read_exact(&mut footer)?;
        if footer[20..24] != STORE_MAGIC {
            return Err(corrupt(path, "missing footer"));
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&footer[0..8]);
        let meta_offset = u64::from_le_bytes(word);
        word.copy_from_slice(&footer[8..16]);
        let meta_len = u64::from_le_bytes(word);
        let crc = u32::from_le_bytes([footer[16], footer[17], footer[18], footer[19]]);

        if meta_offset < HEADER_LEN || meta_offset.checked_add(meta_len) != Some(file_len - FOOTER_LEN) {
            return Err(corrupt(path, "footer does not match file layout"));
        }

        file.seek(SeekFrom::Start(meta_offset))?;
        let mut meta_bytes = vec![0u8; meta_len as usize];
        file.read_exact(&mut meta_bytes)?;
        if crc32fast::hash(&meta_bytes) != crc {
            return Err(corrupt(path, "metadata checksum mismatch"));
        }
        let meta: StoreMeta = bincode::options()
            .with_limit(meta_len.saturating_add(1024))
            .deserialize(&meta_bytes)
            .map_err(|e| corrupt(path, format!("metadata: {}", e)))?;
        if meta.data_end != meta_offset {
            return Err(corrupt(path, "metadata data end does not match footer"));
        }
        let sorted = meta
            .sparse
            .windows(2)
            .all(|w| w[0].0.as_bytes() < w[1].0.as_bytes() && w[0].1 < w[1].1);
        if !sorted {
            return Err(corrupt(path, "sparse index out of order"));
        }

        debug!(path = ?path, entries = meta.entry_count, "Sorted table opened");
        Ok(Self {
            path: path.to_path_buf(),
            file: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            meta,
            block: None,
            _value: PhantomData,
        })
    }

    pub fn len(&self) -> u64 {
        self.meta.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.meta.entry_count == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_block(&mut self, idx: usize) -> Result<(), IndexError> {
        if matches!(self.block, Some((cached, _)) if cached == idx) {
            return Ok(());
        }
        let start = self.meta.sparse[idx].1;
        let end = self
            .meta
            .sparse
            .get(idx + 1)
            .map(|(_, off)| *off)
            .unwrap_or(self.meta.data_end);
        if end < start {
            return Err(corrupt(&self.path, "block bounds inverted"));
        }

        self.file.seek(SeekFrom::Start(start))?;
        let mut bytes = vec![0u8; (end - start) as usize];
        self.file.read_exact(&mut bytes)?;
        self.block = Some((idx, bytes));
        Ok(())
    }

    /// Point lookup.
    pub fn get(&mut self, key: &str) -> Result<Option<V>, IndexError> {
        let idx = self
            .meta
            .sparse
            .partition_point(|(k, _)| k.as_bytes() <= key.as_bytes());
        if idx == 0 {
            return Ok(None);
        }
        self.load_block(idx - 1)?;

        let Some((_, bytes)) = self.block.as_ref() else {
            return Ok(None);
        };
        let mut r = bytes.as_slice();
        while !r.is_empty() {
            let entry_key = read_str(&mut r).map_err(|e| corrupt(&self.path, e.to_string()))?;
            let value = V::decode(&mut r).map_err(|e| corrupt(&self.path, e.to_string()))?;
            match entry_key.as_bytes().cmp(key.as_bytes()) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Equal => return Ok(Some(value)),
                std::cmp::Ordering::Greater => break,
            }
        }
        Ok(None)
    }

    /// Looks up every key; absent keys are left out of the result.
    pub fn get_many<'a, I>(&mut self, keys: I) -> Result<FxHashMap<String, V>, IndexError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut sorted: Vec<&str> = keys.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut found = FxHashMap::default();
        found.reserve(sorted.len());
        // sorted keys hit each block once
        for key in sorted {
            if let Some(value) = self.get(key)? {
                found.insert(key.to_string(), value);
            }
        }
        Ok(found)
    }

    /// Every entry in key order, read through a separate handle.
    pub fn entries(&self) -> Result<StoreEntries<V>, IndexError> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(HEADER_LEN))?;
        Ok(StoreEntries {
            path: self.path.clone(),
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, file).take(self.meta.data_end - HEADER_LEN),
            remaining: self.meta.entry_count,
            _value: PhantomData,
        })
    }

    pub fn close(self) {
        debug!(path = ?self.path, "Sorted table closed");
    }
}

/// Sequential scan over a table's entries.
pub struct StoreEntries<V> {
    path: PathBuf,
    reader: io::Take<BufReader<File>>,
    remaining: u64,
    _value: PhantomData<V>,
}

impl<V: StoreValue> StoreEntries<V> {
    fn read_entry(&mut self) -> io::Result<(String, V)> {
        let key = read_str(&mut self.reader)?;
        let value = V::decode(&mut self.reader)?;
        Ok((key, value))
    }
}

impl<V: StoreValue> Iterator for StoreEntries<V> {
    type Item = Result<(String, V), IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match self.read_entry() {
            Ok(entry) => Some(Ok(entry)),
            Err(e) => {
                self.remaining = 0;
                Some(Err(corrupt(&self.path, e.to_string())))
            }
        }
    }
}
