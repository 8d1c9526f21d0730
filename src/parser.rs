//! Streaming decoder for MediaWiki XML dumps.
//!
//! Pages are pulled one `<page>` element at a time; only the fields of the
//! page currently being read are buffered. Bzip2 input (including
//! multistream dumps made of many concatenated bzip2 streams) is detected by
//! its magic bytes and decompressed lazily as the parser consumes it.

use crate::config::{ARTICLE_NAMESPACE, READ_BUFFER_SIZE};
use crate::content::RecordEnricher;
use crate::error::DecodeError;
use crate::models::PageRecord;
use crate::stats::DecodeStats;
use bzip2::read::MultiBzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const BZIP2_MAGIC: &[u8] = b"BZh";

pub type DumpStream = Box<dyn BufRead + Send>;

/// Caller-supplied predicate; pages for which it returns `false` are skipped.
pub type PageFilter = Arc<dyn Fn(&PageRecord) -> bool + Send + Sync>;

/// Wraps a raw byte stream, transparently decompressing bzip2 input.
pub fn open_stream<R: Read + Send + 'static>(inner: R) -> io::Result<DumpStream> {
    let mut buffered = BufReader::with_capacity(READ_BUFFER_SIZE, inner);
    let is_bzip2 = buffered.fill_buf()?.starts_with(BZIP2_MAGIC);
    if is_bzip2 {
        debug!("bzip2 input detected");
        let decoder = MultiBzDecoder::new(buffered);
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, decoder)))
    } else {
        Ok(Box::new(buffered))
    }
}

pub fn open_dump(path: &Path) -> io::Result<DumpStream> {
    let file = File::open(path)?;
    open_stream(file)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Count the page, log it, and keep going
    #[default]
    Skip,
    /// Surface the error and stop decoding
    Abort,
}

#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Stop after this many admitted pages
    pub limit: Option<u64>,
    /// Drop every redirect page at the source
    pub ignore_redirects: bool,
    /// Namespaces to admit; empty admits all
    pub namespaces: Vec<i32>,
    pub malformed: MalformedPolicy,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            limit: None,
            ignore_redirects: false,
            namespaces: vec![ARTICLE_NAMESPACE],
            malformed: MalformedPolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Page,
    Title,
    Ns,
    Id,
    Redirect,
    Revision,
    Timestamp,
    Text,
    Other,
}

impl Tag {
    fn from_name(name: &[u8]) -> Self {
        match name {
            b"page" => Tag::Page,
            b"title" => Tag::Title,
            b"ns" => Tag::Ns,
            b"id" => Tag::Id,
            b"redirect" => Tag::Redirect,
            b"revision" => Tag::Revision,
            b"timestamp" => Tag::Timestamp,
            b"text" => Tag::Text,
            _ => Tag::Other,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Capture {
    Title,
    Ns,
    Id,
    RevisionId,
    Timestamp,
    Text,
}

impl Capture {
    /// `path` is relative to the enclosing `<page>`.
    fn for_path(path: &[Tag]) -> Option<Self> {
        match path {
            [Tag::Title] => Some(Capture::Title),
            [Tag::Ns] => Some(Capture::Ns),
            [Tag::Id] => Some(Capture::Id),
            [Tag::Revision, Tag::Id] => Some(Capture::RevisionId),
            [Tag::Revision, Tag::Timestamp] => Some(Capture::Timestamp),
            [Tag::Revision, Tag::Text] => Some(Capture::Text),
            _ => None,
        }
    }
}

/// Raw fields of the `<page>` element being read.
#[derive(Debug, Default)]
struct PendingPage {
    offset: u64,
    title: Option<String>,
    ns: Option<String>,
    id: Option<String>,
    redirect: Option<String>,
    revision_id: Option<String>,
    timestamp: Option<String>,
    text: Option<String>,
}

impl PendingPage {
    fn store(&mut self, capture: Capture, value: String) {
        let slot = match capture {
            Capture::Title => &mut self.title,
            Capture::Ns => &mut self.ns,
            Capture::Id => &mut self.id,
            Capture::RevisionId => &mut self.revision_id,
            Capture::Timestamp => &mut self.timestamp,
            Capture::Text => &mut self.text,
        };
        *slot = Some(value);
    }
}

/// Forward-only iterator of admitted pages, in document order.
pub struct DumpReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    options: DecodeOptions,
    stats: Arc<DecodeStats>,
    enricher: Option<Arc<dyn RecordEnricher>>,
    filter: Option<PageFilter>,
    admitted: u64,
    last_offset: Option<u64>,
    finished: bool,
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(stream: R, options: DecodeOptions) -> Self {
        Self::with_stats(stream, options, Arc::new(DecodeStats::new()))
    }

    pub fn with_stats(stream: R, options: DecodeOptions, stats: Arc<DecodeStats>) -> Self {
        Self {
            reader: Reader::from_reader(stream),
            buf: Vec::with_capacity(64 * 1024),
            options,
            stats,
            enricher: None,
            filter: None,
            admitted: 0,
            last_offset: None,
            finished: false,
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn RecordEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_filter(mut self, filter: PageFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn stats(&self) -> Arc<DecodeStats> {
        Arc::clone(&self.stats)
    }

    /// Byte position in the decompressed stream.
    pub fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    /// Offset of the `<page>` element behind the most recently returned
    /// record, in the decompressed stream.
    pub fn last_offset(&self) -> Option<u64> {
        self.last_offset
    }

    /// Reads the next complete `<page>` element, or `None` at a clean end of stream.
    fn read_page(&mut self) -> Result<Option<PendingPage>, DecodeError> {
        let mut pending: Option<PendingPage> = None;
        let mut path: Vec<Tag> = Vec::new();
        let mut capture: Option<Capture> = None;
        let mut text = String::new();

        loop {
            let before = self.reader.buffer_position() as u64;
            self.buf.clear();
            let page_offset = pending.as_ref().map(|p| p.offset);
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| xml_error(e, before, page_offset))?;
            let after = self.reader.buffer_position() as u64;

            match event {
                Event::Start(e) => {
                    let tag = Tag::from_name(e.local_name().as_ref());
                    match pending.as_mut() {
                        None => {
                            if tag == Tag::Page {
                                // `after` sits just past the `>` of `<page ...>`
                                let tag_len = e.len() as u64 + 2;
                                pending = Some(PendingPage {
                                    offset: after.saturating_sub(tag_len),
                                    ..PendingPage::default()
                                });
                            }
                        }
                        Some(page) => {
                            path.push(tag);
                            capture = Capture::for_path(&path);
                            text.clear();
                            if path == [Tag::Redirect] {
                                page.redirect = Some(
                                    redirect_title(&e)
                                        .map_err(|err| xml_error(err, before, page_offset))?,
                                );
                            }
                        }
                    }
                }
                Event::Empty(e) => {
                    if let Some(page) = pending.as_mut() {
                        path.push(Tag::from_name(e.local_name().as_ref()));
                        if let Some(c) = Capture::for_path(&path) {
                            page.store(c, String::new());
                        }
                        if path == [Tag::Redirect] {
                            page.redirect = Some(
                                redirect_title(&e)
                                    .map_err(|err| xml_error(err, before, page_offset))?,
                            );
                        }
                        path.pop();
                    }
                }
                Event::Text(t) => {
                    if capture.is_some() {
                        let unescaped = t
                            .unescape()
                            .map_err(|err| xml_error(err, before, page_offset))?;
                        text.push_str(&unescaped);
                    }
                }
                Event::CData(c) => {
                    if capture.is_some() {
                        let raw = c.into_inner();
                        let decoded = std::str::from_utf8(&raw).map_err(|err| {
                            xml_error(quick_xml::Error::NonDecodable(Some(err)), before, page_offset)
                        })?;
                        text.push_str(decoded);
                    }
                }
                Event::End(_) => {
                    if pending.is_none() {
                        continue;
                    }
                    if path.is_empty() {
                        return Ok(pending);
                    }
                    if let (Some(c), Some(page)) = (capture.take(), pending.as_mut()) {
                        page.store(c, std::mem::take(&mut text));
                    }
                    path.pop();
                }
                Event::Eof => {
                    return match pending {
                        Some(page) => Err(DecodeError::Truncated {
                            offset: page.offset,
                        }),
                        None => Ok(None),
                    };
                }
                _ => {}
            }
        }
    }

    /// Applies validation and filters. `Ok(None)` means the page was skipped.
    fn admit(&self, pending: PendingPage) -> Result<Option<PageRecord>, DecodeError> {
        let offset = pending.offset;

        let page_id = match pending.id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => match raw.parse::<u64>() {
                Ok(id) if id > 0 => id,
                _ => {
                    return Err(DecodeError::MalformedRecord {
                        offset,
                        page_id: None,
                        reason: format!("invalid page id '{}'", raw),
                    })
                }
            },
            _ => {
                return Err(DecodeError::MalformedRecord {
                    offset,
                    page_id: None,
                    reason: "missing <id>".to_string(),
                })
            }
        };

        let title = match pending.title {
            Some(title) if !title.trim().is_empty() => title,
            _ => {
                return Err(DecodeError::MalformedRecord {
                    offset,
                    page_id: Some(page_id),
                    reason: "missing <title>".to_string(),
                })
            }
        };

        let namespace = match pending.ns.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                raw.parse::<i32>()
                    .map_err(|_| DecodeError::MalformedRecord {
                        offset,
                        page_id: Some(page_id),
                        reason: format!("invalid namespace '{}'", raw),
                    })?
            }
            _ => ARTICLE_NAMESPACE,
        };

        if !self.options.namespaces.is_empty() && !self.options.namespaces.contains(&namespace) {
            self.stats.inc_namespace_skipped();
            return Ok(None);
        }

        let mut record = PageRecord {
            title,
            page_id: Some(page_id),
            namespace: Some(namespace),
            revision_id: pending
                .revision_id
                .as_deref()
                .and_then(|raw| raw.trim().parse().ok()),
            timestamp: pending.timestamp.filter(|ts| !ts.trim().is_empty()),
            ..PageRecord::default()
        };

        match pending.redirect {
            Some(target) => {
                let target = target.trim();
                if target.is_empty() {
                    debug!(title = %record.title, "Skipping redirect without target");
                    self.stats.inc_empty_skipped();
                    return Ok(None);
                }
                if self.options.ignore_redirects {
                    self.stats.inc_redirects_skipped();
                    return Ok(None);
                }
                record.redirect_target = Some(target.to_string());
            }
            None => match pending.text {
                Some(text) if !text.trim().is_empty() => record.text = Some(text),
                _ => {
                    debug!(title = %record.title, "Skipping empty page");
                    self.stats.inc_empty_skipped();
                    return Ok(None);
                }
            },
        }

        if let Some(enricher) = &self.enricher {
            enricher.enrich(&mut record);
        }

        if let Some(filter) = &self.filter {
            if !filter(&record) {
                self.stats.inc_filtered();
                return Ok(None);
            }
        }

        Ok(Some(record))
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<PageRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(limit) = self.options.limit {
                if self.admitted >= limit {
                    self.finished = true;
                    return None;
                }
            }

            let pending = match self.read_page() {
                Ok(Some(pending)) => pending,
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };

            let offset = pending.offset;
            match self.admit(pending) {
                Ok(Some(record)) => {
                    self.admitted += 1;
                    self.last_offset = Some(offset);
                    self.stats.inc_admitted(record.is_redirect());
                    return Some(Ok(record));
                }
                Ok(None) => continue,
                Err(e) => {
                    self.stats.inc_malformed();
                    match self.options.malformed {
                        MalformedPolicy::Skip => {
                            warn!(error = %e, "Skipping malformed page");
                        }
                        MalformedPolicy::Abort => {
                            self.finished = true;
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}

fn redirect_title(e: &BytesStart<'_>) -> quick_xml::Result<String> {
    match e.try_get_attribute("title")? {
        Some(attr) => Ok(attr.unescape_value()?.into_owned()),
        None => Ok(String::new()),
    }
}

fn xml_error(err: quick_xml::Error, position: u64, page_offset: Option<u64>) -> DecodeError {
    match (err, page_offset) {
        (quick_xml::Error::UnexpectedEof(_), Some(offset)) => DecodeError::Truncated { offset },
        (quick_xml::Error::Io(e), Some(offset)) if e.kind() == io::ErrorKind::UnexpectedEof => {
            DecodeError::Truncated { offset }
        }
        (quick_xml::Error::Io(e), _) => DecodeError::Io(io::Error::new(e.kind(), e.to_string())),
        (other, _) => DecodeError::Xml {
            offset: position,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::{Cursor, Write};

    fn page(title: &str, ns: i32, id: u64, body: &str) -> String {
        format!(
            "<page><title>{}</title><ns>{}</ns><id>{}</id>{}</page>",
            title, ns, id, body
        )
    }

    fn revision(text: &str) -> String {
        format!(
            "<revision><id>9{}</id><timestamp>2024-01-01T00:00:00Z</timestamp>\
             <contributor><username>Bot</username><id>42</id></contributor>\
             <text xml:space=\"preserve\">{}</text></revision>",
            text.len(),
            text
        )
    }

    fn dump(pages: &[String]) -> String {
        format!("<mediawiki><siteinfo><sitename>Test</sitename></siteinfo>\n  {}\n</mediawiki>", pages.join("\n  "))
    }

    fn decode(xml: &str, options: DecodeOptions) -> Vec<Result<PageRecord, DecodeError>> {
        DumpReader::new(Cursor::new(xml.as_bytes().to_vec()), options).collect()
    }

    fn decode_ok(xml: &str, options: DecodeOptions) -> Vec<PageRecord> {
        decode(xml, options)
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn reads_article_fields() {
        let xml = dump(&[page("Rust", 0, 1, &revision("Rust is fast."))]);
        let pages = decode_ok(&xml, DecodeOptions::default());

        assert_eq!(pages.len(), 1);
        let p = &pages[0];
        assert_eq!(p.title, "Rust");
        assert_eq!(p.page_id, Some(1));
        assert_eq!(p.namespace, Some(0));
        assert_eq!(p.revision_id, Some(913));
        assert_eq!(p.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(p.text.as_deref(), Some("Rust is fast."));
        assert!(!p.is_redirect());
    }

    #[test]
    fn contributor_id_does_not_replace_page_id() {
        let xml = dump(&[page("Rust", 0, 7, &revision("body"))]);
        let pages = decode_ok(&xml, DecodeOptions::default());
        assert_eq!(pages[0].page_id, Some(7));
    }

    #[test]
    fn redirect_keeps_target_and_drops_text() {
        let body = format!(
            "<redirect title=\"Rust\" />{}",
            revision("#REDIRECT [[Rust]]")
        );
        let xml = dump(&[page("Rust lang", 0, 2, &body)]);
        let pages = decode_ok(&xml, DecodeOptions::default());

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].redirect_target.as_deref(), Some("Rust"));
        assert_eq!(pages[0].text, None);
    }

    #[test]
    fn ignore_redirects_drops_them_at_source() {
        let redirect = page("B", 0, 2, &format!("<redirect title=\"A\"/>{}", revision("#REDIRECT [[A]]")));
        let xml = dump(&[page("A", 0, 1, &revision("Hello")), redirect]);

        let mut reader = DumpReader::new(
            Cursor::new(xml.into_bytes()),
            DecodeOptions {
                ignore_redirects: true,
                ..DecodeOptions::default()
            },
        );
        let stats = reader.stats();
        let titles: Vec<String> = reader.by_ref().map(|r| r.unwrap().title).collect();

        assert_eq!(titles, vec!["A"]);
        assert_eq!(stats.redirects_skipped(), 1);
    }

    #[test]
    fn empty_pages_are_skipped_and_counted() {
        let xml = dump(&[
            page("A", 0, 1, &revision("Hello")),
            page("C", 0, 3, "<revision><id>1</id><text bytes=\"0\" /></revision>"),
            page("D", 0, 4, &revision("   ")),
        ]);
        let reader = DumpReader::new(Cursor::new(xml.into_bytes()), DecodeOptions::default());
        let stats = reader.stats();
        let pages: Vec<_> = reader.map(|r| r.unwrap()).collect();

        assert_eq!(pages.len(), 1);
        assert_eq!(stats.empty_skipped(), 2);
        assert_eq!(stats.admitted(), 1);
    }

    #[test]
    fn non_article_namespaces_are_skipped() {
        let xml = dump(&[
            page("File:Logo.svg", 6, 1, &revision("file")),
            page("Rust", 0, 2, &revision("lang")),
            page("Category:Languages", 14, 3, &revision("cat")),
        ]);
        let reader = DumpReader::new(Cursor::new(xml.clone().into_bytes()), DecodeOptions::default());
        let stats = reader.stats();
        let titles: Vec<String> = reader.map(|r| r.unwrap().title).collect();
        assert_eq!(titles, vec!["Rust"]);
        assert_eq!(stats.namespace_skipped(), 2);

        let all = decode_ok(
            &xml,
            DecodeOptions {
                namespaces: Vec::new(),
                ..DecodeOptions::default()
            },
        );
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn limit_stops_after_admitted_pages() {
        let pages: Vec<String> = (1..=10)
            .map(|i| page(&format!("P{}", i), 0, i, &revision("x")))
            .collect();
        let xml = dump(&pages);
        let decoded = decode_ok(
            &xml,
            DecodeOptions {
                limit: Some(4),
                ..DecodeOptions::default()
            },
        );
        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[3].title, "P4");
    }

    #[test]
    fn offsets_point_at_page_elements() {
        let xml = dump(&[
            page("A", 0, 1, &revision("first")),
            page("B", 0, 2, &revision("second")),
        ]);
        let mut reader = DumpReader::new(Cursor::new(xml.clone().into_bytes()), DecodeOptions::default());

        let mut offsets = Vec::new();
        while let Some(pending) = reader.read_page().unwrap() {
            offsets.push(pending.offset as usize);
        }

        let expected: Vec<usize> = xml.match_indices("<page>").map(|(i, _)| i).collect();
        assert_eq!(offsets, expected);
    }

    #[test]
    fn last_offset_follows_admitted_records() {
        let xml = dump(&[
            page("A", 0, 1, &revision("first")),
            page("File:B.png", 6, 2, &revision("skipped")),
            page("C", 0, 3, &revision("third")),
        ]);
        let starts: Vec<u64> = xml.match_indices("<page>").map(|(i, _)| i as u64).collect();
        let mut reader = DumpReader::new(Cursor::new(xml.into_bytes()), DecodeOptions::default());
        assert_eq!(reader.last_offset(), None);

        assert_eq!(reader.next().unwrap().unwrap().title, "A");
        assert_eq!(reader.last_offset(), Some(starts[0]));
        assert_eq!(reader.next().unwrap().unwrap().title, "C");
        assert_eq!(reader.last_offset(), Some(starts[2]));
        assert!(reader.next().is_none());
    }

    #[test]
    fn invalid_utf8_in_cdata_is_an_error() {
        let mut xml = b"<mediawiki><page><title>A</title><ns>0</ns><id>1</id>\
<revision><id>5</id><text><![CDATA[bad ".to_vec();
        xml.extend_from_slice(&[0xff, 0xfe]);
        xml.extend_from_slice(b"]]></text></revision></page></mediawiki>");

        let results: Vec<_> = DumpReader::new(Cursor::new(xml), DecodeOptions::default()).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(DecodeError::Xml { .. })));
    }

    #[test]
    fn missing_title_is_skipped_by_default() {
        let xml = dump(&[
            "<page><ns>0</ns><id>5</id><revision><text>orphan</text></revision></page>".to_string(),
            page("A", 0, 1, &revision("Hello")),
        ]);
        let reader = DumpReader::new(Cursor::new(xml.into_bytes()), DecodeOptions::default());
        let stats = reader.stats();
        let pages: Vec<_> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(pages.len(), 1);
        assert_eq!(stats.malformed(), 1);
    }

    #[test]
    fn missing_id_aborts_with_abort_policy() {
        let xml = dump(&[
            "<page><title>NoId</title><ns>0</ns><revision><text>x</text></revision></page>".to_string(),
            page("A", 0, 1, &revision("Hello")),
        ]);
        let results = decode(
            &xml,
            DecodeOptions {
                malformed: MalformedPolicy::Abort,
                ..DecodeOptions::default()
            },
        );
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(DecodeError::MalformedRecord { page_id: None, .. })
        ));
    }

    #[test]
    fn truncated_page_is_reported() {
        let xml = dump(&[page("A", 0, 1, &revision("Hello"))]);
        let cut = format!("{}<page><title>B</title><ns>0</ns><id>2</id><revision><text>par", &xml[..xml.len() - "</mediawiki>".len()]);
        let results = decode(&cut, DecodeOptions::default());

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().title, "A");
        let expected = cut.rfind("<page>").unwrap() as u64;
        match &results[1] {
            Err(DecodeError::Truncated { offset }) => assert_eq!(*offset, expected),
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn entities_and_cdata_are_decoded() {
        let xml = dump(&[page(
            "AT&amp;T",
            0,
            1,
            "<revision><text>a &lt;ref&gt; b<![CDATA[ <raw> ]]></text></revision>",
        )]);
        let pages = decode_ok(&xml, DecodeOptions::default());
        assert_eq!(pages[0].title, "AT&T");
        assert_eq!(pages[0].text.as_deref(), Some("a <ref> b <raw> "));
    }

    #[test]
    fn namespaced_root_is_supported() {
        let xml = format!(
            "<mediawiki xmlns=\"http://www.mediawiki.org/xml/export-0.11/\" version=\"0.11\">{}</mediawiki>",
            page("Rust", 0, 1, &revision("lang"))
        );
        let pages = decode_ok(&xml, DecodeOptions::default());
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn multistream_bzip2_is_read_as_one_stream() {
        let xml = dump(&[
            page("A", 0, 1, &revision("first")),
            page("B", 0, 2, &revision("second")),
        ]);
        let split = xml.find("  <page><title>B").unwrap();

        let mut compressed = Vec::new();
        for part in [&xml[..split], &xml[split..]] {
            let mut encoder = BzEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(part.as_bytes()).unwrap();
            compressed.extend(encoder.finish().unwrap());
        }

        let stream = open_stream(Cursor::new(compressed)).unwrap();
        let titles: Vec<String> = DumpReader::new(stream, DecodeOptions::default())
            .map(|r| r.unwrap().title)
            .collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn plain_stream_passes_through() {
        let xml = dump(&[page("A", 0, 1, &revision("first"))]);
        let stream = open_stream(Cursor::new(xml.into_bytes())).unwrap();
        let pages: Vec<_> = DumpReader::new(stream, DecodeOptions::default()).collect();
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn filter_rejects_pages() {
        let xml = dump(&[
            page("Keep", 0, 1, &revision("x")),
            page("Drop", 0, 2, &revision("y")),
        ]);
        let reader = DumpReader::new(Cursor::new(xml.into_bytes()), DecodeOptions::default())
            .with_filter(Arc::new(|p: &PageRecord| p.title != "Drop"));
        let stats = reader.stats();
        let titles: Vec<String> = reader.map(|r| r.unwrap().title).collect();
        assert_eq!(titles, vec!["Keep"]);
        assert_eq!(stats.filtered(), 1);
    }
}
