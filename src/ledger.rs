use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::domain::ImageRecord;
use crate::error::BatcherError;
use crate::store::Store;

/// Append-only provenance record backed by a single JSON file.
///
/// Every append rewrites the whole file through [`Store::write_json_atomic`].
/// When a write fails the record stays in memory and is flushed by the next
/// successful append or [`Ledger::persist`].
#[derive(Debug)]
pub struct Ledger {
    path: Utf8PathBuf,
    records: Vec<ImageRecord>,
    filenames: HashSet<String>,
    dirty: bool,
}

impl Ledger {
    /// Loads the ledger at `path`. A missing file is an empty ledger; an
    /// unreadable or unparsable one is an error, never silently discarded.
    pub fn load(path: impl Into<Utf8PathBuf>) -> Result<Self, BatcherError> {
        let path = path.into();
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(%path, "no ledger yet");
                return Ok(Self::empty(path));
            }
            Err(err) => {
                return Err(BatcherError::LedgerRead {
                    path: path.to_string(),
                    message: err.to_string(),
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(Self::empty(path));
        }
        let loaded: Vec<ImageRecord> =
            serde_json::from_str(&content).map_err(|err| BatcherError::LedgerCorrupt {
                path: path.to_string(),
                message: err.to_string(),
            })?;

        let mut ledger = Self::empty(path);
        for record in loaded {
            if ledger.filenames.insert(record.filename.clone()) {
                ledger.records.push(record);
            } else {
                debug!(filename = %record.filename, "dropping repeated ledger entry");
            }
        }
        Ok(ledger)
    }

    fn empty(path: Utf8PathBuf) -> Self {
        Self {
            path,
            records: Vec::new(),
            filenames: HashSet::new(),
            dirty: false,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.filenames.contains(filename)
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.filename.as_str())
    }

    /// True when some appended record has not reached disk yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Appends `record` and rewrites the file. A filename already present is
    /// rejected without touching the ledger.
    pub fn append(&mut self, record: ImageRecord) -> Result<(), BatcherError> {
        if self.filenames.contains(&record.filename) {
            return Err(BatcherError::DuplicateRecord(record.filename));
        }
        self.filenames.insert(record.filename.clone());
        self.records.push(record);
        self.dirty = true;
        self.persist()
    }

    pub fn persist(&mut self) -> Result<(), BatcherError> {
        Store::write_json_atomic(&self.path, &self.records)
            .map_err(|err| BatcherError::LedgerWrite(err.to_string()))?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BatchId;
    use assert_matches::assert_matches;

    fn ledger_path(temp: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(temp.path().join("fetch_images.json")).unwrap()
    }

    #[test]
    fn missing_file_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(ledger_path(&temp)).unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.is_dirty());
    }

    #[test]
    fn append_rejects_known_filename() {
        let temp = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::load(ledger_path(&temp)).unwrap();
        ledger
            .append(ImageRecord::new("a.png", "http://x/a.png", BatchId::new(1)))
            .unwrap();
        let err = ledger
            .append(ImageRecord::new("a.png", "http://y/a.png", BatchId::new(2)))
            .unwrap_err();
        assert_matches!(err, BatcherError::DuplicateRecord(name) if name == "a.png");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = ledger_path(&temp);
        fs::write(path.as_std_path(), b"{not json").unwrap();
        let err = Ledger::load(path).unwrap_err();
        assert_matches!(err, BatcherError::LedgerCorrupt { .. });
    }

    #[test]
    fn failed_write_keeps_record_in_memory() {
        let temp = tempfile::tempdir().unwrap();
        let state = temp.path().join("state");
        fs::create_dir(&state).unwrap();
        let path = Utf8PathBuf::from_path_buf(state.join("fetch_images.json")).unwrap();
        let mut ledger = Ledger::load(path).unwrap();

        fs::remove_dir(&state).unwrap();
        fs::write(&state, b"file, not a directory").unwrap();
        let err = ledger
            .append(ImageRecord::new("a.png", "http://x/a.png", BatchId::new(1)))
            .unwrap_err();
        assert_matches!(err, BatcherError::LedgerWrite(_));
        assert!(ledger.contains("a.png"));
        assert!(ledger.is_dirty());
    }
}
