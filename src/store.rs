use std::fs;
use std::io::{ErrorKind, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;
use tracing::debug;

use crate::domain::BatchId;
use crate::error::BatcherError;

pub const LEDGER_FILE_NAME: &str = "fetch_images.json";
pub const PARTIAL_SUFFIX: &str = ".part";

/// A batch directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDir {
    pub id: BatchId,
    pub name: String,
}

/// On-disk layout: `<images_root>/batch<N>/<filename>`.
#[derive(Debug, Clone)]
pub struct Store {
    images_root: Utf8PathBuf,
}

impl Store {
    pub fn new(images_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            images_root: images_root.into(),
        }
    }

    pub fn images_root(&self) -> &Utf8Path {
        &self.images_root
    }

    pub fn default_ledger_path(&self) -> Utf8PathBuf {
        self.images_root.join(LEDGER_FILE_NAME)
    }

    pub fn batch_dir(&self, batch: BatchId) -> Utf8PathBuf {
        self.images_root.join(batch.dir_name())
    }

    pub fn image_path(&self, batch: BatchId, filename: &str) -> Utf8PathBuf {
        self.batch_dir(batch).join(filename)
    }

    pub fn ensure_root(&self) -> Result<(), BatcherError> {
        fs::create_dir_all(self.images_root.as_std_path())
            .map_err(|err| BatcherError::Filesystem(err.to_string()))
    }

    /// Every `batch<N>` directory under the root, by id then name. The
    /// on-disk name is kept because zero-padded names such as `batch007`
    /// parse to the same id as `batch7`.
    pub fn list_batch_dirs(&self) -> Result<Vec<BatchDir>, BatcherError> {
        let entries = match fs::read_dir(self.images_root.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(BatcherError::Filesystem(err.to_string())),
        };
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| BatcherError::Filesystem(err.to_string()))?;
            let is_dir = entry
                .file_type()
                .map(|kind| kind.is_dir())
                .map_err(|err| BatcherError::Filesystem(err.to_string()))?;
            if !is_dir {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match name.parse::<BatchId>() {
                Ok(id) => dirs.push(BatchDir { id, name }),
                Err(_) => debug!(%name, "ignoring non-batch directory"),
            }
        }
        dirs.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(&b.name)));
        Ok(dirs)
    }

    /// Distinct batch ids present under the root, ascending.
    pub fn list_batches(&self) -> Result<Vec<BatchId>, BatcherError> {
        let mut ids: Vec<BatchId> = self.list_batch_dirs()?.into_iter().map(|dir| dir.id).collect();
        ids.dedup();
        Ok(ids)
    }

    /// Image file names in the canonical `batch<N>` directory of `batch`.
    pub fn list_batch_files(&self, batch: BatchId) -> Result<Vec<String>, BatcherError> {
        self.list_files_in(&self.batch_dir(batch))
    }

    /// Image file names inside a scanned batch directory.
    pub fn list_dir_files(&self, dir: &BatchDir) -> Result<Vec<String>, BatcherError> {
        self.list_files_in(&self.images_root.join(&dir.name))
    }

    /// File names in `dir`, sorted. In-flight temporary files are skipped.
    fn list_files_in(&self, dir: &Utf8Path) -> Result<Vec<String>, BatcherError> {
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| BatcherError::Filesystem(format!("read {dir}: {err}")))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| BatcherError::Filesystem(err.to_string()))?;
            let is_file = entry
                .file_type()
                .map(|kind| kind.is_file())
                .map_err(|err| BatcherError::Filesystem(err.to_string()))?;
            if !is_file {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            files.push(name);
        }
        files.sort();
        Ok(files)
    }

    /// Creates the directory for a fresh batch. Fails if it already exists,
    /// so a batch id is never handed out twice.
    pub fn create_batch_dir(&self, batch: BatchId) -> Result<Utf8PathBuf, BatcherError> {
        self.ensure_root()?;
        let dir = self.batch_dir(batch);
        fs::create_dir(dir.as_std_path())
            .map_err(|err| BatcherError::Filesystem(format!("create {dir}: {err}")))?;
        Ok(dir)
    }

    /// Writes image bytes next to their final name and renames them into
    /// place. An existing file is never replaced.
    pub fn write_image(
        &self,
        batch: BatchId,
        filename: &str,
        content: &[u8],
    ) -> Result<Utf8PathBuf, BatcherError> {
        let dir = self.batch_dir(batch);
        let dest = dir.join(filename);
        let mut temp = Builder::new()
            .prefix(".incoming-")
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(dir.as_std_path())
            .map_err(|err| BatcherError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| BatcherError::Filesystem(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| BatcherError::Filesystem(err.to_string()))?;
        temp.persist_noclobber(dest.as_std_path())
            .map_err(|err| match err.error.kind() {
                ErrorKind::AlreadyExists => BatcherError::FileExists(filename.to_string()),
                _ => BatcherError::Filesystem(format!("persist {dest}: {}", err.error)),
            })?;
        Ok(dest)
    }

    /// Serializes `value` as pretty JSON into a temp file beside `path` and
    /// renames it over `path`, so readers see either the old or the new file.
    pub fn write_json_atomic<T: Serialize + ?Sized>(
        path: &Utf8Path,
        value: &T,
    ) -> Result<(), BatcherError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| BatcherError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| BatcherError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".ledger-")
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(parent.as_std_path())
            .map_err(|err| BatcherError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| BatcherError::Filesystem(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| BatcherError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| BatcherError::Filesystem(err.error.to_string()))?;
        Ok(())
    }
}
