//! Small dump files cut from a large one, for tests and debugging.

use crate::error::DecodeError;
use crate::parser::open_dump;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use quick_xml::events::{BytesDecl, BytesEnd, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::Writer;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use tracing::info;

fn write_error(err: impl Display, offset: u64) -> DecodeError {
    DecodeError::Xml {
        offset,
        message: err.to_string(),
    }
}

/// Copies the root element and the first `limit` `<page>` elements of
/// `input` into `output`. Other children of the root (e.g. `<siteinfo>`) are
/// left out. Returns the writer and the number of pages copied.
pub fn copy_pages<R: BufRead, W: Write>(input: R, output: W, limit: usize) -> Result<(u64, W), DecodeError> {
    let mut reader = Reader::from_reader(input);
    let mut writer = Writer::new(output);
    let mut buf = Vec::new();
    let mut root: Option<Vec<u8>> = None;
    let mut depth = 0usize;
    let mut page_offset: Option<u64> = None;
    let mut copied = 0u64;

    let pos = |r: &Reader<R>| r.buffer_position() as u64;

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| write_error(e, 0))?;
    writer
        .write_event(Event::Text(BytesText::from_escaped("\n")))
        .map_err(|e| write_error(e, 0))?;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| match page_offset {
            Some(offset) if matches!(e, quick_xml::Error::UnexpectedEof(_)) => {
                DecodeError::Truncated { offset }
            }
            _ => write_error(e, pos(&reader)),
        })?;
        let at = pos(&reader);

        match event {
            Event::Start(e) => {
                depth += 1;
                if depth == 1 {
                    root = Some(e.name().as_ref().to_vec());
                    writer.write_event(Event::Start(e)).map_err(|e| write_error(e, at))?;
                } else if page_offset.is_some() {
                    writer.write_event(Event::Start(e)).map_err(|e| write_error(e, at))?;
                } else if depth == 2 && e.local_name().as_ref() == b"page" {
                    if copied as usize >= limit {
                        break;
                    }
                    page_offset = Some(at.saturating_sub(e.len() as u64 + 2));
                    writer
                        .write_event(Event::Text(BytesText::from_escaped("\n  ")))
                        .map_err(|e| write_error(e, at))?;
                    writer.write_event(Event::Start(e)).map_err(|e| write_error(e, at))?;
                }
            }
            Event::End(e) => {
                if page_offset.is_some() {
                    writer.write_event(Event::End(e)).map_err(|e| write_error(e, at))?;
                    if depth == 2 {
                        page_offset = None;
                        copied += 1;
                    }
                }
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => {
                if let Some(offset) = page_offset {
                    return Err(DecodeError::Truncated { offset });
                }
                break;
            }
            other => {
                if page_offset.is_some() {
                    writer.write_event(other).map_err(|e| write_error(e, at))?;
                }
            }
        }
        buf.clear();
    }

    if let Some(name) = root {
        let name = String::from_utf8_lossy(&name).into_owned();
        writer
            .write_event(Event::Text(BytesText::from_escaped("\n")))
            .map_err(|e| write_error(e, 0))?;
        writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(|e| write_error(e, 0))?;
        writer
            .write_event(Event::Text(BytesText::from_escaped("\n")))
            .map_err(|e| write_error(e, 0))?;
    }

    Ok((copied, writer.into_inner()))
}

/// Writes a sample dump to `output`; a `.bz2` extension selects bzip2
/// compression. `input` may itself be plain or bzip2.
pub fn write_sample(input: &Path, output: &Path, limit: usize) -> Result<u64, DecodeError> {
    let stream = open_dump(input)?;
    let file = BufWriter::new(File::create(output)?);
    let compress = output
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("bz2"))
        .unwrap_or(false);

    let copied = if compress {
        let encoder = BzEncoder::new(file, Compression::best());
        let (copied, encoder) = copy_pages(stream, encoder, limit)?;
        encoder.finish()?.flush()?;
        copied
    } else {
        let (copied, mut file) = copy_pages(stream, file, limit)?;
        file.flush()?;
        copied
    };

    info!(pages = copied, output = ?output, compressed = compress, "Sample dump written");
    Ok(copied)
}
