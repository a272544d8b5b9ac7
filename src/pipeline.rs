use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::batch::BatchAllocator;
use crate::dedup::DedupIndex;
use crate::domain::{BatchId, ImageRecord};
use crate::error::BatcherError;
use crate::filename::normalize_filename;
use crate::ledger::Ledger;
use crate::source::{ImageSource, image_url};
use crate::store::Store;

/// Result of one ingestion cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The listing could not be fetched or parsed. Nothing changed.
    UpstreamFailed { message: String },
    /// Every listed image is already known. No batch was created.
    NothingNew { listed: usize, malformed: usize },
    /// New images were listed but none could be stored. No batch was created
    /// and the skipped images are retried next cycle.
    NothingSaved {
        listed: usize,
        malformed: usize,
        skipped: Vec<SkippedImage>,
    },
    Ingested(BatchReport),
}

impl CycleOutcome {
    pub fn saved_count(&self) -> usize {
        match self {
            CycleOutcome::Ingested(report) => report.saved.len(),
            _ => 0,
        }
    }

    pub fn batch(&self) -> Option<BatchId> {
        match self {
            CycleOutcome::Ingested(report) => Some(report.batch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch: BatchId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub listed: usize,
    pub malformed: usize,
    pub saved: Vec<ImageRecord>,
    pub skipped: Vec<SkippedImage>,
    /// Set when a ledger write failed and the rest of the batch was left
    /// for the next cycle.
    pub aborted: Option<String>,
}

impl BatchReport {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty() || self.aborted.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedImage {
    pub filename: String,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub images_root: String,
    pub ledger_path: String,
    pub current_batch: BatchId,
    pub batches: usize,
    pub ledger_entries: usize,
    pub known_filenames: usize,
    /// `batchN/file` paths on disk with no ledger entry, typically images
    /// saved before the ledger existed.
    pub untracked: Vec<String>,
}

#[derive(Debug, Clone)]
struct Candidate {
    filename: String,
    url: String,
}

/// Owns all mutable ingestion state. Built once per process and driven by
/// the scheduler; nothing else mutates storage.
pub struct Pipeline<S: ImageSource> {
    allocator: BatchAllocator,
    ledger: Ledger,
    index: DedupIndex,
    source: S,
}

impl<S: ImageSource> Pipeline<S> {
    /// Bootstraps the images root, loads the ledger and rebuilds the dedup
    /// index from ledger and disk.
    pub fn open(
        store: Store,
        ledger_path: impl Into<Utf8PathBuf>,
        source: S,
    ) -> Result<Self, BatcherError> {
        store.ensure_root()?;
        let ledger = Ledger::load(ledger_path)?;
        let index = DedupIndex::rebuild(&store, &ledger)?;
        let allocator = BatchAllocator::new(store);
        info!(
            root = %allocator.store().images_root(),
            current_batch = %allocator.current_batch()?,
            ledger_entries = ledger.len(),
            "pipeline ready"
        );
        Ok(Self::from_parts(allocator, ledger, index, source))
    }

    pub fn from_parts(
        allocator: BatchAllocator,
        ledger: Ledger,
        index: DedupIndex,
        source: S,
    ) -> Self {
        Self {
            allocator,
            ledger,
            index,
            source,
        }
    }

    pub fn store(&self) -> &Store {
        self.allocator.store()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn index(&self) -> &DedupIndex {
        &self.index
    }

    pub fn ledger_path(&self) -> &Utf8Path {
        self.ledger.path()
    }

    /// Fetch, filter, download, allocate on first success, persist.
    ///
    /// Only a failure to allocate the batch directory is returned as `Err`;
    /// everything else is reported through [`CycleOutcome`].
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, BatcherError> {
        let started_at = Utc::now();
        self.flush_pending_ledger();

        let items = match self.source.fetch_listing() {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "listing fetch failed, cycle skipped");
                return Ok(CycleOutcome::UpstreamFailed {
                    message: err.to_string(),
                });
            }
        };
        let listed = items.len();
        let (candidates, malformed) = self.select_new(&items);
        if malformed > 0 {
            debug!(malformed, "listing items without image_url ignored");
        }
        if candidates.is_empty() {
            info!(listed, "no new images");
            return Ok(CycleOutcome::NothingNew { listed, malformed });
        }

        info!(count = candidates.len(), "saving new images");
        // Allocated by the first successful download only.
        let mut batch: Option<BatchId> = None;
        let mut saved = Vec::new();
        let mut skipped = Vec::new();
        let mut aborted = None;

        for candidate in candidates {
            let bytes = match self.source.download(&candidate.url) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(filename = %candidate.filename, error = %err, "download failed");
                    skipped.push(skip(candidate, &err));
                    continue;
                }
            };
            let target = match batch {
                Some(target) => target,
                None => {
                    let (allocated, _) = self.allocator.allocate_next()?;
                    batch = Some(allocated);
                    allocated
                }
            };
            if let Err(err) = self
                .allocator
                .store()
                .write_image(target, &candidate.filename, &bytes)
            {
                warn!(batch = %target, filename = %candidate.filename, error = %err, "write failed");
                skipped.push(skip(candidate, &err));
                continue;
            }

            self.index.add(candidate.filename.clone());
            let record = ImageRecord::new(candidate.filename, candidate.url, target);
            let appended = self.ledger.append(record.clone());
            debug!(batch = %target, filename = %record.filename, "saved");
            saved.push(record);
            // The file is on disk, so index and in-memory ledger keep it even
            // when the ledger write fails.
            if let Err(err) = appended {
                error!(batch = %target, error = %err, "ledger update failed, stopping batch");
                aborted = Some(err.to_string());
                break;
            }
        }

        let Some(batch) = batch else {
            warn!(listed, skipped = skipped.len(), "no new image could be downloaded");
            return Ok(CycleOutcome::NothingSaved {
                listed,
                malformed,
                skipped,
            });
        };
        let report = BatchReport {
            batch,
            started_at,
            finished_at: Utc::now(),
            listed,
            malformed,
            saved,
            skipped,
            aborted,
        };
        info!(
            batch = %batch,
            saved = report.saved.len(),
            skipped = report.skipped.len(),
            "batch finished"
        );
        Ok(CycleOutcome::Ingested(report))
    }

    /// Listing items whose normalized filename is unknown, in listing order,
    /// with repeats inside the listing dropped. Also returns how many items
    /// carried no usable URL.
    fn select_new(&self, items: &[Value]) -> (Vec<Candidate>, usize) {
        let mut malformed = 0usize;
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for item in items {
            let Some(url) = image_url(item) else {
                malformed += 1;
                continue;
            };
            let filename = normalize_filename(url);
            if self.index.contains(&filename) || !seen.insert(filename.clone()) {
                continue;
            }
            candidates.push(Candidate {
                filename,
                url: url.to_string(),
            });
        }
        (candidates, malformed)
    }

    fn flush_pending_ledger(&mut self) {
        if !self.ledger.is_dirty() {
            return;
        }
        match self.ledger.persist() {
            Ok(()) => info!(entries = self.ledger.len(), "pending ledger entries written"),
            Err(err) => warn!(error = %err, "ledger still not writable"),
        }
    }

    pub fn status(&self) -> Result<PipelineStatus, BatcherError> {
        PipelineStatus::collect(self.allocator.store(), &self.ledger, &self.index)
    }
}

impl PipelineStatus {
    /// Read-only report over the images root. Nothing is created, so this is
    /// safe to call against a root that does not exist yet.
    pub fn collect(
        store: &Store,
        ledger: &Ledger,
        index: &DedupIndex,
    ) -> Result<Self, BatcherError> {
        let dirs = store.list_batch_dirs()?;
        let mut untracked = Vec::new();
        for dir in &dirs {
            for file in store.list_dir_files(dir)? {
                if !ledger.contains(&file) {
                    untracked.push(format!("{}/{file}", dir.name));
                }
            }
        }
        Ok(Self {
            images_root: store.images_root().to_string(),
            ledger_path: ledger.path().to_string(),
            current_batch: dirs.last().map(|dir| dir.id).unwrap_or(BatchId::EMPTY),
            batches: dirs.len(),
            ledger_entries: ledger.len(),
            known_filenames: index.len(),
            untracked,
        })
    }
}

fn skip(candidate: Candidate, err: &BatcherError) -> SkippedImage {
    SkippedImage {
        filename: candidate.filename,
        url: candidate.url,
        reason: err.to_string(),
    }
}
