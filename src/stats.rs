use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the decoder and the conversion job. Shared behind an
/// `Arc` so progress reporting can read them while the pipeline runs.
#[derive(Default, Debug)]
pub struct DecodeStats {
    pub pages_admitted: AtomicU64,
    pub articles_admitted: AtomicU64,
    pub redirects_admitted: AtomicU64,
    pub redirects_skipped: AtomicU64,
    pub empty_skipped: AtomicU64,
    pub namespace_skipped: AtomicU64,
    pub filtered_skipped: AtomicU64,
    pub malformed_pages: AtomicU64,
}

impl DecodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_admitted(&self, is_redirect: bool) {
        self.pages_admitted.fetch_add(1, Ordering::Relaxed);
        if is_redirect {
            self.redirects_admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.articles_admitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_redirects_skipped(&self) {
        self.redirects_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_empty_skipped(&self) {
        self.empty_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_namespace_skipped(&self) {
        self.namespace_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_filtered(&self) {
        self.filtered_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_malformed(&self) {
        self.malformed_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admitted(&self) -> u64 {
        self.pages_admitted.load(Ordering::Relaxed)
    }

    pub fn articles(&self) -> u64 {
        self.articles_admitted.load(Ordering::Relaxed)
    }

    pub fn redirects(&self) -> u64 {
        self.redirects_admitted.load(Ordering::Relaxed)
    }

    pub fn redirects_skipped(&self) -> u64 {
        self.redirects_skipped.load(Ordering::Relaxed)
    }

    pub fn empty_skipped(&self) -> u64 {
        self.empty_skipped.load(Ordering::Relaxed)
    }

    pub fn namespace_skipped(&self) -> u64 {
        self.namespace_skipped.load(Ordering::Relaxed)
    }

    pub fn filtered(&self) -> u64 {
        self.filtered_skipped.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed_pages.load(Ordering::Relaxed)
    }

    /// Pages seen but not admitted, for any reason.
    pub fn skipped(&self) -> u64 {
        self.redirects_skipped()
            + self.empty_skipped()
            + self.namespace_skipped()
            + self.filtered()
            + self.malformed()
    }

    /// Point-in-time copy for reporting
    pub fn to_report(&self, container_bytes: u64) -> ConversionReport {
        ConversionReport {
            admitted: self.admitted(),
            articles: self.articles(),
            redirects: self.redirects(),
            skipped_redirects: self.redirects_skipped(),
            skipped_empty: self.empty_skipped(),
            skipped_namespace: self.namespace_skipped(),
            skipped_filtered: self.filtered(),
            malformed: self.malformed(),
            container_bytes,
        }
    }
}

/// Outcome of a finished conversion job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionReport {
    pub admitted: u64,
    pub articles: u64,
    pub redirects: u64,
    pub skipped_redirects: u64,
    pub skipped_empty: u64,
    pub skipped_namespace: u64,
    pub skipped_filtered: u64,
    pub malformed: u64,
    pub container_bytes: u64,
}
