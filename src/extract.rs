//! Conversion job and read-side extractor.
//!
//! [`convert`] drives decoder, container writer, and index builder in one
//! pass. [`Extractor`] opens a finished destination directory for scans,
//! batched scans, and title lookups.

use crate::config::{CONTAINER_FILE, POSITIONS_FILE, PROGRESS_INTERVAL, REDIRECTS_FILE};
use crate::container::{Codec, ContainerInfo, ContainerReader, ContainerWriter, PageIter};
use crate::content::RecordEnricher;
use crate::error::{ContainerError, Error, Result};
use crate::index::{IndexBuilder, IndexSummary, TitleIndex};
use crate::models::{Field, FieldSet, PageRecord};
use crate::parser::{open_dump, open_stream, DecodeOptions, DumpReader, PageFilter};
use crate::stats::{ConversionReport, DecodeStats};
use indicatif::ProgressBar;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Called with the live counters every `progress_interval` admitted pages.
pub type ProgressCallback = Arc<dyn Fn(&DecodeStats) + Send + Sync>;

/// Cooperative stop signal for a running conversion. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Settings for one conversion job.
#[derive(Clone)]
pub struct ConvertOptions {
    pub decode: DecodeOptions,
    /// Fields written to the container
    pub fields: FieldSet,
    pub codec: Codec,
    pub enricher: Option<Arc<dyn RecordEnricher>>,
    pub filter: Option<PageFilter>,
    pub cancel: CancelToken,
    pub show_progress: bool,
    pub progress_interval: u64,
    pub progress: Option<ProgressCallback>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            decode: DecodeOptions::default(),
            fields: FieldSet::all(),
            codec: Codec::default(),
            enricher: None,
            filter: None,
            cancel: CancelToken::new(),
            show_progress: false,
            progress_interval: PROGRESS_INTERVAL,
            progress: None,
        }
    }
}

impl ConvertOptions {
    /// Drops `suppressed` from the stored fields. Key fields are rejected here,
    /// before any record is written.
    pub fn suppress(mut self, suppressed: &[Field]) -> std::result::Result<Self, ContainerError> {
        self.fields = FieldSet::suppressing(suppressed)?;
        Ok(self)
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Deletes the outputs of any earlier conversion into `dir`.
fn remove_outputs(dir: &Path) -> io::Result<()> {
    for name in [CONTAINER_FILE, POSITIONS_FILE, REDIRECTS_FILE] {
        let path = dir.join(name);
        remove_if_exists(&path)?;
        remove_if_exists(&path.with_extension("idx.tmp"))?;
    }
    Ok(())
}

/// Converts a dump stream (plain or bzip2) into `dest_dir`.
///
/// The indexes are committed before the container trailer, so an error or a
/// cancellation at any point leaves a container that readers refuse as
/// incomplete.
pub fn convert<R: Read + Send + 'static>(
    source: R,
    dest_dir: &Path,
    options: &ConvertOptions,
) -> Result<ConversionReport> {
    let stream = open_stream(source)?;
    convert_stream(stream, dest_dir, options)
}

/// Same as [`convert`], reading the dump from a file.
pub fn convert_file(path: &Path, dest_dir: &Path, options: &ConvertOptions) -> Result<ConversionReport> {
    info!(path = ?path, "Opening dump");
    let stream = open_dump(path)?;
    convert_stream(stream, dest_dir, options)
}

fn progress_message(stats: &DecodeStats) -> String {
    format!(
        "{} pages admitted, {} skipped",
        stats.admitted(),
        stats.skipped()
    )
}

fn convert_stream<R: io::BufRead>(
    stream: R,
    dest_dir: &Path,
    options: &ConvertOptions,
) -> Result<ConversionReport> {
    fs::create_dir_all(dest_dir)?;
    remove_outputs(dest_dir)?;

    let start = Instant::now();
    let stats = Arc::new(DecodeStats::new());
    let mut reader = DumpReader::with_stats(stream, options.decode.clone(), Arc::clone(&stats));
    if let Some(enricher) = &options.enricher {
        reader = reader.with_enricher(Arc::clone(enricher));
    }
    if let Some(filter) = &options.filter {
        reader = reader.with_filter(Arc::clone(filter));
    }

    let mut writer = ContainerWriter::create(&dest_dir.join(CONTAINER_FILE), options.fields, options.codec)?;
    let mut index = IndexBuilder::new();
    let interval = options.progress_interval.max(1);

    let pb = if options.show_progress {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };

    info!(dest = ?dest_dir, codec = %options.codec, "Starting conversion");

    loop {
        if options.cancel.is_cancelled() {
            pb.abandon();
            let admitted = stats.admitted();
            warn!(admitted, "Conversion cancelled; container left incomplete");
            return Err(Error::Cancelled { admitted });
        }

        let page = match reader.next() {
            Some(page) => page?,
            None => break,
        };

        let offset = writer.append(&page)?;
        index.add_page(&page, offset)?;

        let admitted = writer.record_count();
        if admitted % interval == 0 {
            pb.set_message(progress_message(&stats));
            pb.tick();
            if let Some(progress) = &options.progress {
                progress(&stats);
            }
        }
    }

    pb.finish_and_clear();

    let summary = index.finish(dest_dir)?;
    let container_bytes = writer.finish()?;
    let report = stats.to_report(container_bytes);

    info!(
        admitted = report.admitted,
        articles = report.articles,
        redirects = report.redirects,
        positions = summary.positions,
        skipped_redirects = report.skipped_redirects,
        skipped_empty = report.skipped_empty,
        skipped_namespace = report.skipped_namespace,
        skipped_filtered = report.skipped_filtered,
        malformed = report.malformed,
        bytes = container_bytes,
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Conversion complete"
    );

    Ok(report)
}

/// Groups a fallible iterator into ordered batches of `size` items; the last
/// batch may be shorter. An error ends the sequence after it is yielded, and
/// items already gathered for that batch are dropped.
pub struct Batches<I> {
    inner: I,
    size: usize,
    done: bool,
}

impl<I> Batches<I> {
    pub fn new(inner: I, size: usize) -> Self {
        Self {
            inner,
            size: size.max(1),
            done: false,
        }
    }
}

impl<I, T, E> Iterator for Batches<I>
where
    I: Iterator<Item = std::result::Result<T, E>>,
{
    type Item = std::result::Result<Vec<T>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Vec::with_capacity(self.size);
        while batch.len() < self.size {
            match self.inner.next() {
                Some(Ok(item)) => batch.push(item),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

/// Read handle over a converted destination directory.
pub struct Extractor {
    dir: PathBuf,
    container: ContainerReader,
    index: TitleIndex,
}

impl Extractor {
    pub fn open(dir: &Path) -> Result<Self> {
        let container = ContainerReader::open(&dir.join(CONTAINER_FILE))?;
        let index = TitleIndex::open(dir)?;
        info!(
            dir = ?dir,
            records = container.info().record_count,
            "Extractor opened"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            container,
            index,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn info(&self) -> &ContainerInfo {
        self.container.info()
    }

    pub fn index_summary(&self) -> IndexSummary {
        self.index.summary()
    }

    /// Restartable scan in container order.
    pub fn iter_pages(&self, limit: Option<usize>) -> Result<PageIter> {
        Ok(self.container.pages(limit)?)
    }

    pub fn iter_page_batches(&self, batch_size: usize, limit: Option<usize>) -> Result<Batches<PageIter>> {
        Ok(Batches::new(self.iter_pages(limit)?, batch_size))
    }

    /// Records keyed by the requested title. Titles not found are left out.
    pub fn get_pages_by_title<'a, I>(
        &mut self,
        titles: I,
        resolve_redirects: bool,
    ) -> Result<FxHashMap<String, PageRecord>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let offsets = self.index.lookup_many(titles, resolve_redirects)?;

        // decode each offset once, in file order
        let mut by_offset: Vec<(u64, String)> = offsets.into_iter().map(|(t, o)| (o, t)).collect();
        by_offset.sort_unstable();

        let mut pages = FxHashMap::default();
        pages.reserve(by_offset.len());
        let mut last: Option<(u64, PageRecord)> = None;
        for (offset, title) in by_offset {
            let page = match &last {
                Some((at, page)) if *at == offset => page.clone(),
                _ => {
                    let page = self.container.decode_at(offset)?;
                    last = Some((offset, page.clone()));
                    page
                }
            };
            pages.insert(title, page);
        }
        debug!(found = pages.len(), "Title lookup finished");
        Ok(pages)
    }

    pub fn get_page_by_title(&mut self, title: &str, resolve_redirects: bool) -> Result<Option<PageRecord>> {
        let offset = if resolve_redirects {
            self.index.resolve(title)?
        } else {
            self.index.position(title)?
        };
        match offset {
            Some(offset) => Ok(Some(self.container.decode_at(offset)?)),
            None => Ok(None),
        }
    }

    /// Applies `f` to every batch on the rayon pool. `f` receives the batch
    /// number; results come back in batch order.
    pub fn process_batches_parallel<T, F>(
        &self,
        batch_size: usize,
        limit: Option<usize>,
        f: F,
    ) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize, &[PageRecord]) -> T + Sync + Send,
    {
        let window = rayon::current_num_threads().max(1) * 2;
        let mut batches = self.iter_page_batches(batch_size, limit)?;
        let mut results = Vec::new();

        loop {
            let mut chunk = Vec::with_capacity(window);
            for batch in batches.by_ref().take(window) {
                chunk.push(batch?);
            }
            if chunk.is_empty() {
                break;
            }
            let base = results.len();
            let mapped: Vec<T> = chunk
                .par_iter()
                .enumerate()
                .map(|(i, batch)| f(base + i, batch.as_slice()))
                .collect();
            results.extend(mapped);
        }

        Ok(results)
    }

    pub fn close(self) {
        self.container.close();
        self.index.close();
        debug!(dir = ?self.dir, "Extractor closed");
    }
}
