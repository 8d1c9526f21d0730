/// Container file written inside the destination directory
pub const CONTAINER_FILE: &str = "pages.wsc";

/// Sorted table mapping canonical title -> container offset
pub const POSITIONS_FILE: &str = "positions.idx";

/// Sorted table mapping redirect title -> canonical title
pub const REDIRECTS_FILE: &str = "redirects.idx";

/// Container header magic
pub const CONTAINER_MAGIC: [u8; 4] = *b"WSTC";

/// Container trailer magic, present only once the writer has finished
pub const TRAILER_MAGIC: [u8; 4] = *b"WSTE";

/// Current container format version
pub const CONTAINER_VERSION: u8 = 1;

/// Sorted table header and footer magic
pub const STORE_MAGIC: [u8; 4] = *b"WSKV";

/// Current sorted table format version
pub const STORE_VERSION: u8 = 1;

/// Every Nth key of a sorted table is kept in its sparse index
pub const SPARSE_INDEX_INTERVAL: usize = 64;

/// zstd level used for per-record compression
pub const ZSTD_LEVEL: i32 = 3;

/// Largest record frame the reader will accept (guards against corrupt lengths)
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// Progress update interval (tick every N pages)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Buffer size for reading dumps and containers
pub const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Buffer size for container and index writers
pub const WRITE_BUFFER_SIZE: usize = 128 * 1024;

/// Default number of pages per batch
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Article namespace
pub const ARTICLE_NAMESPACE: i32 = 0;
