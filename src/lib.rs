//! Wikistash: MediaWiki dump conversion into an indexed binary container
//!
//! This crate turns a (possibly bzip2 multistream) Wikipedia XML dump into a
//! compact container of page records plus two title indexes, then serves
//! sequential scans and title lookups over the result without loading it
//! into memory.
//!
//! 1. **Decode** -- Stream `<page>` elements into [`models::PageRecord`]s, dropping
//!    empty stubs, foreign namespaces and (optionally) redirects
//! 2. **Write** -- Append each record to the container as its own checksummed,
//!    optionally zstd-compressed frame and note the frame's offset
//! 3. **Index** -- Commit `title -> offset` and `redirect -> canonical title` as two
//!    sorted tables with sparse indexes
//! 4. **Read** -- Scan, batch, or look pages up by title, following at most one
//!    redirect hop
//!
//! # Architecture
//!
//! - **Streaming XML parsing** -- Only the current page is buffered; offsets are
//!   positions in the decompressed stream
//! - **Single-pass conversion** -- Decode, encode, and index run in document order
//! - **Self-describing container** -- A JSON schema descriptor follows the header;
//!   a trailer written last marks the container complete
//! - **Independent readers** -- Every reader handle owns its own file cursor
//! - **Atomic operations** -- Lock-free counters readable while a job runs
//!
//! # Key Modules
//!
//! - [`parser`] -- Streaming XML decoder with bzip2 detection
//! - [`container`] -- Container writer and reader
//! - [`store`] -- Sorted key/value tables
//! - [`index`] -- Index builder, title index, redirect resolution
//! - [`extract`] -- Conversion job, cancellation, batch and title reads
//! - [`content`] -- Optional category and tag enrichment
//! - [`sample`] -- Cutting small dumps out of large ones
//! - [`models`] -- Page records and field sets
//! - [`codec`] -- Varint and string encoding
//! - [`stats`] -- Thread-safe atomic counters and the conversion report
//! - [`error`] -- Error types
//! - [`config`] -- File names, format constants, and defaults
//!
//! # Example Usage
//!
//! ```bash
//! # Convert a dump, dropping revision metadata
//! wikistash convert -i enwiki-latest-pages-articles-multistream.xml.bz2 -o out/ \
//!     --suppress timestamp,revision_id
//!
//! # Fetch pages by title (redirects are followed)
//! wikistash get -d out/ "Rust (programming language)" "Rust lang"
//! ```

pub mod codec;
pub mod config;
pub mod container;
pub mod content;
pub mod error;
pub mod extract;
pub mod index;
pub mod models;
pub mod parser;
pub mod sample;
pub mod stats;
pub mod store;
