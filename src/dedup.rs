use std::collections::HashSet;

use tracing::info;

use crate::error::BatcherError;
use crate::ledger::Ledger;
use crate::store::Store;

/// Every filename ever ingested, consulted before any download.
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    known: HashSet<String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unions the files found in every batch directory with the ledger's
    /// filenames. Must run before the first cycle.
    pub fn rebuild(store: &Store, ledger: &Ledger) -> Result<Self, BatcherError> {
        let mut index = Self::new();
        let mut scanned = 0usize;
        for dir in store.list_batch_dirs()? {
            for file in store.list_dir_files(&dir)? {
                scanned += 1;
                index.add(file);
            }
        }
        let from_ledger = ledger.filenames().filter(|name| index.add(*name)).count();
        info!(
            known = index.len(),
            scanned, from_ledger, "dedup index rebuilt"
        );
        Ok(index)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.known.contains(filename)
    }

    /// Returns true when `filename` was not known before.
    pub fn add(&mut self, filename: impl Into<String>) -> bool {
        self.known.insert(filename.into())
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
