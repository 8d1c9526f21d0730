use crate::config::{POSITIONS_FILE, REDIRECTS_FILE};
use crate::error::IndexError;
use crate::models::{PageRecord, PageType};
use crate::store::{write_store, StoreReader};
use rustc_hash::FxHashMap;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Entry counts of a committed index pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub positions: u64,
    pub redirects: u64,
}

/// Accumulates title entries during a conversion pass and commits them as two
/// sorted tables.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    positions: BTreeMap<String, u64>,
    redirects: BTreeMap<String, String>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_position(&mut self, title: &str, offset: u64) -> Result<(), IndexError> {
        match self.positions.entry(title.to_string()) {
            Entry::Occupied(_) => Err(IndexError::DuplicateKey {
                store: "positions",
                key: title.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(offset);
                Ok(())
            }
        }
    }

    pub fn add_redirect(&mut self, title: &str, target: &str) -> Result<(), IndexError> {
        match self.redirects.entry(title.to_string()) {
            Entry::Occupied(_) => Err(IndexError::DuplicateKey {
                store: "redirects",
                key: title.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(target.to_string());
                Ok(())
            }
        }
    }

    /// Routes an admitted record to the store matching its type.
    pub fn add_page(&mut self, page: &PageRecord, offset: u64) -> Result<(), IndexError> {
        match page.page_type() {
            PageType::Article => self.add_position(&page.title, offset),
            PageType::Redirect(target) => self.add_redirect(&page.title, &target),
        }
    }

    pub fn stats(&self) -> (usize, usize) {
        (self.positions.len(), self.redirects.len())
    }

    /// A redirect pointing at another redirect (or at itself) is an anomaly.
    fn check_chains(&self) -> Result<(), IndexError> {
        for (title, target) in &self.redirects {
            if self.redirects.contains_key(target) {
                return Err(IndexError::ChainedRedirect {
                    title: title.clone(),
                    target: target.clone(),
                });
            }
        }
        Ok(())
    }

    /// Validates redirects, then writes both tables into `dir`.
    pub fn finish(self, dir: &Path) -> Result<IndexSummary, IndexError> {
        self.check_chains()?;

        let positions = write_store(&dir.join(POSITIONS_FILE), &self.positions)?;
        let redirects = write_store(&dir.join(REDIRECTS_FILE), &self.redirects)?;

        info!(positions, redirects, "Title index committed");
        Ok(IndexSummary {
            positions,
            redirects,
        })
    }
}

/// Read side of the title index: the position and redirect tables opened
/// with their own handles.
pub struct TitleIndex {
    positions: StoreReader<u64>,
    redirects: StoreReader<String>,
}

impl TitleIndex {
    pub fn open(dir: &Path) -> Result<Self, IndexError> {
        let positions = StoreReader::open(&dir.join(POSITIONS_FILE))?;
        let redirects = StoreReader::open(&dir.join(REDIRECTS_FILE))?;
        debug!(
            positions = positions.len(),
            redirects = redirects.len(),
            "Title index opened"
        );
        Ok(Self {
            positions,
            redirects,
        })
    }

    pub fn summary(&self) -> IndexSummary {
        IndexSummary {
            positions: self.positions.len(),
            redirects: self.redirects.len(),
        }
    }

    pub fn position(&mut self, title: &str) -> Result<Option<u64>, IndexError> {
        self.positions.get(title)
    }

    pub fn redirect_target(&mut self, title: &str) -> Result<Option<String>, IndexError> {
        self.redirects.get(title)
    }

    /// Follows at most one redirect, then looks up the container offset.
    pub fn resolve(&mut self, title: &str) -> Result<Option<u64>, IndexError> {
        match self.redirects.get(title)? {
            Some(target) => {
                if self.redirects.get(&target)?.is_some() {
                    return Err(IndexError::ChainedRedirect {
                        title: title.to_string(),
                        target,
                    });
                }
                debug!(from = title, to = %target, "Following redirect");
                self.positions.get(&target)
            }
            None => self.positions.get(title),
        }
    }

    /// Offsets keyed by the requested title. Titles that resolve to nothing
    /// are absent from the result.
    pub fn lookup_many<'a, I>(
        &mut self,
        titles: I,
        resolve_redirects: bool,
    ) -> Result<FxHashMap<String, u64>, IndexError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let requested: Vec<&str> = titles.into_iter().collect();

        let redirected = if resolve_redirects {
            self.redirects.get_many(requested.iter().copied())?
        } else {
            FxHashMap::default()
        };

        if !redirected.is_empty() {
            let chained = self
                .redirects
                .get_many(redirected.values().map(String::as_str))?;
            if let Some((title, target)) = redirected
                .iter()
                .find(|(_, target)| chained.contains_key(target.as_str()))
            {
                return Err(IndexError::ChainedRedirect {
                    title: title.clone(),
                    target: target.clone(),
                });
            }
        }

        let canonical: Vec<(&str, &str)> = requested
            .iter()
            .map(|title| {
                let target = redirected.get(*title).map(String::as_str).unwrap_or(*title);
                (*title, target)
            })
            .collect();
        let offsets = self
            .positions
            .get_many(canonical.iter().map(|(_, target)| *target))?;

        let mut found = FxHashMap::default();
        for (title, target) in canonical {
            if let Some(offset) = offsets.get(target) {
                found.insert(title.to_string(), *offset);
            }
        }
        Ok(found)
    }

    pub fn positions(&self) -> &StoreReader<u64> {
        &self.positions
    }

    pub fn redirects(&self) -> &StoreReader<String> {
        &self.redirects
    }

    /// Releases both table handles.
    pub fn close(self) {
        self.positions.close();
        self.redirects.close();
    }
}
