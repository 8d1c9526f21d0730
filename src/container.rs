//! Binary page container.
//!
//! All fixed-width numeric fields are little-endian.
//!
//! Layout:
//! ```text
//! [Header 16B][schema_len u32][Schema JSON][Frame]...[Frame][Trailer 32B]
//!
//! Header:  magic "WSTC" | version u8 | codec u8 | field mask u16 | reserved 8B
//! Frame:   payload_len u32 | crc32(payload) u32 | payload
//! Trailer: magic "WSTE" | record_count u64 | data_end u64 | crc32 u32 | reserved 8B
//! ```
//!
//! A frame's payload is one record encoded field by field in schema order,
//! compressed on its own when the codec is zstd. Offsets handed out by the
//! writer are absolute file positions of frames, so the reader decodes any
//! record with one seek and one read. The trailer is written only by
//! [`ContainerWriter::finish`]; a container without it is incomplete and is
//! refused by [`ContainerReader::open`].

use crate::codec::{
    read_presence, read_str, read_uvarint, unzigzag, write_presence, write_str, write_uvarint,
    zigzag,
};
use crate::config::{
    CONTAINER_MAGIC, CONTAINER_VERSION, MAX_FRAME_LEN, READ_BUFFER_SIZE, TRAILER_MAGIC,
    WRITE_BUFFER_SIZE, ZSTD_LEVEL,
};
use crate::error::ContainerError;
use crate::models::{Field, FieldSet, PageRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const HEADER_LEN: u64 = 16;
pub const TRAILER_LEN: u64 = 32;
const FRAME_HEADER_LEN: u64 = 8;
const SCHEMA_NAME: &str = "PageRecord";

/// Per-record compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    None,
    #[default]
    Zstd,
}

impl Codec {
    fn id(self) -> u8 {
        match self {
            Codec::None => 0,
            Codec::Zstd => 1,
        }
    }

    fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Codec::None),
            1 => Some(Codec::Zstd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Zstd => "zstd",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "null" => Ok(Codec::None),
            "zstd" | "zstandard" => Ok(Codec::Zstd),
            other => Err(format!("unknown codec '{}'", other)),
        }
    }
}

/// Self-description embedded after the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    pub version: u8,
    pub codec: String,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl SchemaDescriptor {
    fn new(fields: FieldSet, codec: Codec) -> Self {
        Self {
            name: SCHEMA_NAME.to_string(),
            version: CONTAINER_VERSION,
            codec: codec.name().to_string(),
            fields: fields
                .iter()
                .map(|f| FieldDescriptor {
                    name: f.name().to_string(),
                    kind: f.kind().name().to_string(),
                })
                .collect(),
        }
    }

    /// Resolves the descriptor into the field order used to decode records.
    fn layout(&self) -> Result<Vec<Field>, ContainerError> {
        if self.name != SCHEMA_NAME {
            return Err(ContainerError::UnsupportedSchema(format!(
                "record type '{}'",
                self.name
            )));
        }
        let mut layout = Vec::with_capacity(self.fields.len());
        for desc in &self.fields {
            let field = Field::from_name(&desc.name).ok_or_else(|| {
                ContainerError::UnsupportedSchema(format!("unknown field '{}'", desc.name))
            })?;
            if field.kind().name() != desc.kind {
                return Err(ContainerError::UnsupportedSchema(format!(
                    "field '{}' has type '{}', expected '{}'",
                    desc.name,
                    desc.kind,
                    field.kind().name()
                )));
            }
            if layout.contains(&field) {
                return Err(ContainerError::UnsupportedSchema(format!(
                    "field '{}' listed twice",
                    desc.name
                )));
            }
            layout.push(field);
        }
        if !layout.contains(&Field::Title) {
            return Err(ContainerError::UnsupportedSchema(
                "schema has no title field".to_string(),
            ));
        }
        Ok(layout)
    }
}

fn encode_record(page: &PageRecord, fields: FieldSet, out: &mut Vec<u8>) -> io::Result<()> {
    for field in fields.iter() {
        match field {
            Field::PageId => write_opt_u64(out, page.page_id)?,
            Field::Title => write_opt_str(out, Some(&page.title))?,
            Field::Namespace => {
                write_presence(&mut *out, page.namespace.is_some())?;
                if let Some(ns) = page.namespace {
                    write_uvarint(&mut *out, zigzag(i64::from(ns)))?;
                }
            }
            Field::RedirectTarget => write_opt_str(out, page.redirect_target.as_deref())?,
            Field::RevisionId => write_opt_u64(out, page.revision_id)?,
            Field::Timestamp => write_opt_str(out, page.timestamp.as_deref())?,
            Field::Text => write_opt_str(out, page.text.as_deref())?,
            Field::Categories => write_opt_list(out, page.categories.as_deref())?,
            Field::Tags => write_opt_list(out, page.tags.as_deref())?,
        }
    }
    Ok(())
}

fn write_opt_u64(out: &mut Vec<u8>, value: Option<u64>) -> io::Result<()> {
    write_presence(&mut *out, value.is_some())?;
    if let Some(v) = value {
        write_uvarint(&mut *out, v)?;
    }
    Ok(())
}

fn write_opt_str(out: &mut Vec<u8>, value: Option<&str>) -> io::Result<()> {
    write_presence(&mut *out, value.is_some())?;
    if let Some(s) = value {
        write_str(&mut *out, s)?;
    }
    Ok(())
}

fn write_opt_list(out: &mut Vec<u8>, value: Option<&[String]>) -> io::Result<()> {
    write_presence(&mut *out, value.is_some())?;
    if let Some(items) = value {
        write_uvarint(&mut *out, items.len() as u64)?;
        for item in items {
            write_str(&mut *out, item)?;
        }
    }
    Ok(())
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

fn decode_record(payload: &[u8], layout: &[Field]) -> io::Result<PageRecord> {
    let mut r = payload;
    let mut page = PageRecord::default();
    let mut has_title = false;

    for field in layout {
        if !read_presence(&mut r)? {
            continue;
        }
        match field {
            Field::PageId => page.page_id = Some(read_uvarint(&mut r)?),
            Field::Title => {
                page.title = read_str(&mut r)?;
                has_title = true;
            }
            Field::Namespace => {
                let ns = unzigzag(read_uvarint(&mut r)?);
                page.namespace =
                    Some(i32::try_from(ns).map_err(|_| invalid("namespace out of range"))?);
            }
            Field::RedirectTarget => page.redirect_target = Some(read_str(&mut r)?),
            Field::RevisionId => page.revision_id = Some(read_uvarint(&mut r)?),
            Field::Timestamp => page.timestamp = Some(read_str(&mut r)?),
            Field::Text => page.text = Some(read_str(&mut r)?),
            Field::Categories => page.categories = Some(read_list(&mut r)?),
            Field::Tags => page.tags = Some(read_list(&mut r)?),
        }
    }

    if !has_title {
        return Err(invalid("record without title"));
    }
    if !r.is_empty() {
        return Err(invalid("trailing bytes after record"));
    }
    Ok(page)
}

fn read_list(r: &mut &[u8]) -> io::Result<Vec<String>> {
    let count = read_uvarint(&mut *r)?;
    // each entry takes at least one byte
    if count > r.len() as u64 {
        return Err(invalid("list length exceeds record"));
    }
    (0..count).map(|_| read_str(&mut *r)).collect()
}

fn write_header<W: Write>(mut w: W, codec: Codec, fields: FieldSet) -> io::Result<()> {
    let mut buf = [0u8; HEADER_LEN as usize];
    buf[0..4].copy_from_slice(&CONTAINER_MAGIC);
    buf[4] = CONTAINER_VERSION;
    buf[5] = codec.id();
    buf[6..8].copy_from_slice(&fields.mask().to_le_bytes());
    w.write_all(&buf)
}

fn encode_trailer(record_count: u64, data_end: u64) -> [u8; TRAILER_LEN as usize] {
    let mut buf = [0u8; TRAILER_LEN as usize];
    buf[0..4].copy_from_slice(&TRAILER_MAGIC);
    buf[4..12].copy_from_slice(&record_count.to_le_bytes());
    buf[12..20].copy_from_slice(&data_end.to_le_bytes());
    let crc = crc32fast::hash(&buf[4..20]);
    buf[20..24].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Writes page records in arrival order and reports each record's offset.
pub struct ContainerWriter {
    path: PathBuf,
    out: BufWriter<File>,
    codec: Codec,
    fields: FieldSet,
    position: u64,
    record_count: u64,
    scratch: Vec<u8>,
    finished: bool,
}

impl ContainerWriter {
    /// Creates (or truncates) the container at `path`.
    pub fn create(path: &Path, fields: FieldSet, codec: Codec) -> Result<Self, ContainerError> {
        let file = File::create(path)?;
        let mut out = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

        let schema = serde_json::to_vec(&SchemaDescriptor::new(fields, codec))
            .map_err(|e| ContainerError::UnsupportedSchema(e.to_string()))?;

        write_header(&mut out, codec, fields)?;
        out.write_all(&(schema.len() as u32).to_le_bytes())?;
        out.write_all(&schema)?;

        debug!(path = ?path, codec = %codec, fields = fields.iter().count(), "Container created");

        Ok(Self {
            path: path.to_path_buf(),
            out,
            codec,
            fields,
            position: HEADER_LEN + 4 + schema.len() as u64,
            record_count: 0,
            scratch: Vec::with_capacity(64 * 1024),
            finished: false,
        })
    }

    /// Serialises `page` and returns the offset at which its frame begins.
    pub fn append(&mut self, page: &PageRecord) -> Result<u64, ContainerError> {
        let offset = self.position;

        self.scratch.clear();
        encode_record(page, self.fields, &mut self.scratch)?;
        let compressed;
        let payload: &[u8] = match self.codec {
            Codec::None => &self.scratch,
            Codec::Zstd => {
                compressed = zstd::encode_all(self.scratch.as_slice(), ZSTD_LEVEL)?;
                &compressed
            }
        };

        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= MAX_FRAME_LEN)
            .ok_or_else(|| ContainerError::CorruptRecord {
                offset,
                reason: format!(
                    "record '{}' encodes to {} bytes, above the frame limit",
                    page.title,
                    payload.len()
                ),
            })?;
        let crc = crc32fast::hash(payload);

        self.out.write_all(&len.to_le_bytes())?;
        self.out.write_all(&crc.to_le_bytes())?;
        self.out.write_all(payload)?;

        self.position += FRAME_HEADER_LEN + u64::from(len);
        self.record_count += 1;
        Ok(offset)
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn bytes_written(&self) -> u64 {
        self.position
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the trailer and syncs the file. Returns the container size.
    pub fn finish(mut self) -> Result<u64, ContainerError> {
        let trailer = encode_trailer(self.record_count, self.position);
        self.out.write_all(&trailer)?;
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        self.finished = true;

        let total = self.position + TRAILER_LEN;
        info!(
            records = self.record_count,
            bytes = total,
            path = ?self.path,
            "Container finished"
        );
        Ok(total)
    }
}

impl Drop for ContainerWriter {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.out.flush() {
                warn!(error = %e, "Failed to flush incomplete container");
            }
            warn!(
                records = self.record_count,
                path = ?self.path,
                "Container closed without trailer; marked incomplete"
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub version: u8,
    pub codec: Codec,
    pub fields: FieldSet,
    pub schema: SchemaDescriptor,
    pub record_count: u64,
    pub data_start: u64,
    pub data_end: u64,
}

fn read_exact_at<R: Read>(r: &mut R, buf: &mut [u8], offset: u64, what: &str) -> Result<(), ContainerError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ContainerError::CorruptRecord {
                offset,
                reason: format!("truncated {}", what),
            }
        } else {
            ContainerError::Io(e)
        }
    })
}

/// Reads one frame starting at `offset`. Returns the record and the frame size.
fn read_frame<R: Read>(
    r: &mut R,
    offset: u64,
    data_end: u64,
    codec: Codec,
    layout: &[Field],
    payload: &mut Vec<u8>,
) -> Result<(PageRecord, u64), ContainerError> {
    let mut head = [0u8; FRAME_HEADER_LEN as usize];
    read_exact_at(r, &mut head, offset, "frame header")?;
    let len = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
    let crc = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);

    let frame_len = FRAME_HEADER_LEN + u64::from(len);
    if len > MAX_FRAME_LEN || offset.checked_add(frame_len).map_or(true, |end| end > data_end) {
        return Err(ContainerError::CorruptRecord {
            offset,
            reason: format!("frame length {} runs past the data region", len),
        });
    }

    payload.clear();
    payload.resize(len as usize, 0);
    read_exact_at(r, payload, offset, "frame payload")?;

    if crc32fast::hash(payload) != crc {
        return Err(ContainerError::CorruptRecord {
            offset,
            reason: "checksum mismatch".to_string(),
        });
    }

    let decoded = match codec {
        Codec::None => decode_record(payload, layout),
        Codec::Zstd => zstd::decode_all(payload.as_slice())
            .and_then(|raw| decode_record(&raw, layout)),
    };
    let page = decoded.map_err(|e| ContainerError::CorruptRecord {
        offset,
        reason: e.to_string(),
    })?;
    Ok((page, frame_len))
}

/// Read handle over a finished container. Each handle owns its file cursor.
pub struct ContainerReader {
    path: PathBuf,
    file: BufReader<File>,
    info: ContainerInfo,
    layout: Vec<Field>,
    payload: Vec<u8>,
}

impl ContainerReader {
    pub fn open(path: &Path) -> Result<Self, ContainerError> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        if file_len < HEADER_LEN + 4 {
            return Err(ContainerError::CorruptRecord {
                offset: 0,
                reason: "file too small for a container header".to_string(),
            });
        }

        let mut header = [0u8; HEADER_LEN as usize];
        read_exact_at(&mut file, &mut header, 0, "header")?;
        if header[0..4] != CONTAINER_MAGIC {
            return Err(ContainerError::CorruptRecord {
                offset: 0,
                reason: "bad magic".to_string(),
            });
        }
        let version = header[4];
        if version == 0 || version > CONTAINER_VERSION {
            return Err(ContainerError::UnsupportedSchema(format!(
                "container version {} (supported: {})",
                version, CONTAINER_VERSION
            )));
        }
        let codec = Codec::from_id(header[5]).ok_or_else(|| {
            ContainerError::UnsupportedSchema(format!("codec id {}", header[5]))
        })?;
        let mask = u16::from_le_bytes([header[6], header[7]]);

        let mut len_buf = [0u8; 4];
        read_exact_at(&mut file, &mut len_buf, HEADER_LEN, "schema length")?;
        let schema_len = u64::from(u32::from_le_bytes(len_buf));
        let data_start = HEADER_LEN + 4 + schema_len;
        if data_start > file_len {
            return Err(ContainerError::CorruptRecord {
                offset: HEADER_LEN,
                reason: format!("schema length {} exceeds file size", schema_len),
            });
        }
        let mut schema_bytes = vec![0u8; schema_len as usize];
        read_exact_at(&mut file, &mut schema_bytes, HEADER_LEN + 4, "schema")?;
        let schema: SchemaDescriptor = serde_json::from_slice(&schema_bytes)
            .map_err(|e| ContainerError::UnsupportedSchema(format!("schema descriptor: {}", e)))?;
        if schema.version != version {
            return Err(ContainerError::UnsupportedSchema(format!(
                "schema version {} does not match header version {}",
                schema.version, version
            )));
        }
        if schema.codec != codec.name() {
            return Err(ContainerError::UnsupportedSchema(format!(
                "schema codec '{}' does not match header codec '{}'",
                schema.codec, codec
            )));
        }
        let layout = schema.layout()?;

        if file_len < data_start + TRAILER_LEN {
            return Err(ContainerError::Incomplete);
        }
        let trailer_at = file_len - TRAILER_LEN;
        file.seek(SeekFrom::Start(trailer_at))?;
        let mut trailer = [0u8; TRAILER_LEN as usize];
        read_exact_at(&mut file, &mut trailer, trailer_at, "trailer")?;
        if trailer[0..4] != TRAILER_MAGIC {
            return Err(ContainerError::Incomplete);
        }
        let stored_crc = u32::from_le_bytes([trailer[20], trailer[21], trailer[22], trailer[23]]);
        if crc32fast::hash(&trailer[4..20]) != stored_crc {
            return Err(ContainerError::CorruptRecord {
                offset: trailer_at,
                reason: "trailer checksum mismatch".to_string(),
            });
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&trailer[4..12]);
        let record_count = u64::from_le_bytes(word);
        word.copy_from_slice(&trailer[12..20]);
        let data_end = u64::from_le_bytes(word);
        if data_end != trailer_at {
            return Err(ContainerError::CorruptRecord {
                offset: trailer_at,
                reason: format!("trailer data end {} does not match file layout", data_end),
            });
        }

        let info = ContainerInfo {
            version,
            codec,
            fields: FieldSet::from_mask(mask),
            schema,
            record_count,
            data_start,
            data_end,
        };
        debug!(path = ?path, records = record_count, codec = %codec, "Container opened");

        Ok(Self {
            path: path.to_path_buf(),
            file: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            info,
            layout,
            payload: Vec::new(),
        })
    }

    pub fn info(&self) -> &ContainerInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Independent handle on the same container.
    pub fn try_clone(&self) -> Result<Self, ContainerError> {
        Self::open(&self.path)
    }

    /// Seeks to `offset` and decodes the record framed there.
    pub fn decode_at(&mut self, offset: u64) -> Result<PageRecord, ContainerError> {
        if offset < self.info.data_start
            || offset
                .checked_add(FRAME_HEADER_LEN)
                .map_or(true, |end| end > self.info.data_end)
        {
            return Err(ContainerError::CorruptRecord {
                offset,
                reason: "offset outside the data region".to_string(),
            });
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let (page, _) = read_frame(
            &mut self.file,
            offset,
            self.info.data_end,
            self.info.codec,
            &self.layout,
            &mut self.payload,
        )?;
        Ok(page)
    }

    /// Sequential scan from the first record. Every call opens a fresh cursor.
    pub fn pages(&self, limit: Option<usize>) -> Result<PageIter, ContainerError> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.info.data_start))?;
        Ok(PageIter {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            position: self.info.data_start,
            data_end: self.info.data_end,
            codec: self.info.codec,
            layout: self.layout.clone(),
            payload: Vec::new(),
            remaining: limit,
            done: false,
        })
    }

    pub fn close(self) {
        debug!(path = ?self.path, "Container closed");
    }
}

/// Lazy, finite scan over a container's records.
pub struct PageIter {
    reader: BufReader<File>,
    position: u64,
    data_end: u64,
    codec: Codec,
    layout: Vec<Field>,
    payload: Vec<u8>,
    remaining: Option<usize>,
    done: bool,
}

impl PageIter {
    /// Offset of the next record to be yielded.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Iterator for PageIter {
    type Item = Result<PageRecord, ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.position >= self.data_end || self.remaining == Some(0) {
            return None;
        }
        match read_frame(
            &mut self.reader,
            self.position,
            self.data_end,
            self.codec,
            &self.layout,
            &mut self.payload,
        ) {
            Ok((page, frame_len)) => {
                self.position += frame_len;
                if let Some(n) = self.remaining.as_mut() {
                    *n -= 1;
                }
                Some(Ok(page))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_pages() -> Vec<PageRecord> {
        let mut rust = PageRecord::article("Rust", 1, "Rust is a language.\n[[Category:Languages]]");
        rust.revision_id = Some(100);
        rust.timestamp = Some("2024-01-15T10:30:00Z".to_string());
        rust.categories = Some(vec!["Languages".to_string()]);
        rust.tags = Some(Vec::new());

        let mut talk = PageRecord::article("Talk:Rust", 2, "Discussion");
        talk.namespace = Some(1);

        let mut special = PageRecord::article("Special:Random", 3, "négatif ✓");
        special.namespace = Some(-1);

        vec![rust, PageRecord::redirect("Rust lang", 4, "Rust"), talk, special]
    }

    fn write_container(path: &Path, pages: &[PageRecord], fields: FieldSet, codec: Codec) -> Vec<u64> {
        let mut writer = ContainerWriter::create(path, fields, codec).unwrap();
        let offsets = pages.iter().map(|p| writer.append(p).unwrap()).collect();
        writer.finish().unwrap();
        offsets
    }

    #[test]
    fn decode_at_roundtrips_every_record() {
        for codec in [Codec::None, Codec::Zstd] {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("pages.wsc");
            let pages = sample_pages();
            let offsets = write_container(&path, &pages, FieldSet::all(), codec);

            let mut reader = ContainerReader::open(&path).unwrap();
            assert_eq!(reader.info().record_count, pages.len() as u64);
            assert_eq!(reader.info().codec, codec);
            // out of order on purpose
            for i in [3usize, 0, 2, 1] {
                assert_eq!(reader.decode_at(offsets[i]).unwrap(), pages[i]);
            }
        }
    }

    #[test]
    fn suppressed_fields_read_back_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.wsc");
        let fields = FieldSet::suppressing(&[Field::Timestamp, Field::RevisionId]).unwrap();
        let pages = sample_pages();
        let offsets = write_container(&path, &pages, fields, Codec::Zstd);

        let mut reader = ContainerReader::open(&path).unwrap();
        let first = reader.decode_at(offsets[0]).unwrap();
        assert_eq!(first, pages[0].retain_fields(fields));
        assert_eq!(first.timestamp, None);
        assert_eq!(first.revision_id, None);
        assert_eq!(first.text, pages[0].text);
        assert_eq!(reader.info().fields, fields);
    }

    #[test]
    fn pages_is_restartable_and_honours_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.wsc");
        let pages = sample_pages();
        write_container(&path, &pages, FieldSet::all(), Codec::Zstd);

        let reader = ContainerReader::open(&path).unwrap();
        let first: Vec<_> = reader.pages(None).unwrap().map(|r| r.unwrap()).collect();
        let second: Vec<_> = reader.pages(None).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(first, pages);
        assert_eq!(second, pages);

        let limited: Vec<_> = reader.pages(Some(2)).unwrap().collect();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn empty_container_is_valid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.wsc");
        write_container(&path, &[], FieldSet::all(), Codec::None);

        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.info().record_count, 0);
        assert_eq!(reader.pages(None).unwrap().count(), 0);
    }

    #[test]
    fn unfinished_container_is_incomplete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.wsc");
        {
            let mut writer = ContainerWriter::create(&path, FieldSet::all(), Codec::Zstd).unwrap();
            for page in sample_pages() {
                writer.append(&page).unwrap();
            }
        }
        assert!(matches!(
            ContainerReader::open(&path),
            Err(ContainerError::Incomplete)
        ));
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.wsc");
        std::fs::write(&path, b"this is not a container at all, just text").unwrap();
        assert!(matches!(
            ContainerReader::open(&path),
            Err(ContainerError::CorruptRecord { offset: 0, .. })
        ));
    }

    #[test]
    fn future_version_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.wsc");
        write_container(&path, &sample_pages(), FieldSet::all(), Codec::Zstd);

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[4] = CONTAINER_VERSION + 1;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            ContainerReader::open(&path),
            Err(ContainerError::UnsupportedSchema(_))
        ));
    }

    #[test]
    fn unknown_schema_field_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.wsc");
        write_container(&path, &sample_pages(), FieldSet::all(), Codec::Zstd);

        let mut bytes = std::fs::read(&path).unwrap();
        let needle = b"\"tags\"";
        let at = bytes
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap();
        bytes[at..at + needle.len()].copy_from_slice(b"\"tagz\"");
        std::fs::write(&path, &bytes).unwrap();

        match ContainerReader::open(&path) {
            Err(ContainerError::UnsupportedSchema(msg)) => assert!(msg.contains("tagz")),
            other => panic!("expected UnsupportedSchema, got {:?}", other.err()),
        }
    }

    #[test]
    fn flipped_payload_byte_is_corrupt_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.wsc");
        let offsets = write_container(&path, &sample_pages(), FieldSet::all(), Codec::None);

        let mut bytes = std::fs::read(&path).unwrap();
        let target = offsets[1] as usize + FRAME_HEADER_LEN as usize + 2;
        bytes[target] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let mut reader = ContainerReader::open(&path).unwrap();
        // unrelated records still decode
        assert_eq!(reader.decode_at(offsets[0]).unwrap().title, "Rust");
        match reader.decode_at(offsets[1]) {
            Err(ContainerError::CorruptRecord { offset, .. }) => assert_eq!(offset, offsets[1]),
            other => panic!("expected CorruptRecord, got {:?}", other),
        }
        assert_eq!(reader.decode_at(offsets[2]).unwrap().title, "Talk:Rust");
    }

    #[test]
    fn offset_outside_data_region_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.wsc");
        write_container(&path, &sample_pages(), FieldSet::all(), Codec::Zstd);

        let mut reader = ContainerReader::open(&path).unwrap();
        let end = reader.info().data_end;
        assert!(matches!(
            reader.decode_at(0),
            Err(ContainerError::CorruptRecord { offset: 0, .. })
        ));
        assert!(matches!(
            reader.decode_at(end),
            Err(ContainerError::CorruptRecord { .. })
        ));
        assert!(matches!(
            reader.decode_at(u64::MAX),
            Err(ContainerError::CorruptRecord { offset: u64::MAX, .. })
        ));
        assert!(matches!(
            reader.decode_at(u64::MAX - FRAME_HEADER_LEN + 1),
            Err(ContainerError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn misaligned_offset_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.wsc");
        let offsets = write_container(&path, &sample_pages(), FieldSet::all(), Codec::Zstd);

        let mut reader = ContainerReader::open(&path).unwrap();
        assert!(reader.decode_at(offsets[0] + 3).is_err());
    }

    #[test]
    fn schema_is_self_describing_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.wsc");
        let fields = FieldSet::suppressing(&[Field::Tags]).unwrap();
        write_container(&path, &sample_pages(), fields, Codec::None);

        let bytes = std::fs::read(&path).unwrap();
        let len = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;
        let schema: serde_json::Value = serde_json::from_slice(&bytes[20..20 + len]).unwrap();

        assert_eq!(schema["name"], "PageRecord");
        assert_eq!(schema["codec"], "none");
        let names: Vec<&str> = schema["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["page_id", "title", "namespace", "redirect_target", "revision_id", "timestamp", "text", "categories"]
        );
    }

    #[test]
    fn reader_follows_descriptor_order_for_older_layouts() {
        // A container whose descriptor lists fewer fields decodes the rest as absent.
        let layout = vec![Field::Title, Field::Text];
        let mut payload = Vec::new();
        write_opt_str(&mut payload, Some("Old")).unwrap();
        write_opt_str(&mut payload, Some("body")).unwrap();

        let page = decode_record(&payload, &layout).unwrap();
        assert_eq!(page.title, "Old");
        assert_eq!(page.text.as_deref(), Some("body"));
        assert_eq!(page.page_id, None);
    }

    #[test]
    fn codec_parses_names() {
        assert_eq!("zstd".parse::<Codec>(), Ok(Codec::Zstd));
        assert_eq!("none".parse::<Codec>(), Ok(Codec::None));
        assert!("lz4".parse::<Codec>().is_err());
    }
}
