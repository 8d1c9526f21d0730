use thiserror::Error;

/// Errors raised while turning a dump stream into page records.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("dump truncated inside <page> starting at offset {offset}")]
    Truncated { offset: u64 },

    #[error("malformed page at offset {offset} (page id {page_id:?}): {reason}")]
    MalformedRecord {
        offset: u64,
        page_id: Option<u64>,
        reason: String,
    },

    #[error("xml error near offset {offset}: {message}")]
    Xml { offset: u64, message: String },

    #[error("io error while reading dump: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the container writer and reader.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("unsupported container schema: {0}")]
    UnsupportedSchema(String),

    #[error("container is incomplete (no trailer); the conversion did not finish")]
    Incomplete,

    #[error("field '{0}' cannot be suppressed")]
    InvalidSuppression(String),

    #[error("container io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while building or reading the title indexes.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("duplicate key in {store} index: '{key}'")]
    DuplicateKey { store: &'static str, key: String },

    #[error("chained redirect: '{title}' -> '{target}', which is itself a redirect")]
    ChainedRedirect { title: String, target: String },

    #[error("corrupt index store {path}: {reason}")]
    CorruptStore { path: String, reason: String },

    #[error("unsupported index store {path}: {reason}")]
    UnsupportedStore { path: String, reason: String },

    #[error("index io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-level error for conversion jobs and extractor reads.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("conversion cancelled after {admitted} admitted pages")]
    Cancelled { admitted: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
