use std::cmp::Reverse;
use std::fs;
use std::time::SystemTime;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::BatchId;
use crate::error::BatcherError;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct GalleryBatch {
    pub batch: BatchId,
    /// Directory name on disk; may be zero-padded.
    pub name: String,
    /// Newest first.
    pub files: Vec<String>,
}

/// Read-only view of the batch directories for display and file serving.
/// Listings are computed on every call.
#[derive(Debug, Clone)]
pub struct Gallery {
    store: Store,
}

impl Gallery {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Batches newest first; within a batch, files by modification time
    /// then name, newest first.
    pub fn list(&self) -> Result<Vec<GalleryBatch>, BatcherError> {
        let mut batches = Vec::new();
        for batch_dir in self.store.list_batch_dirs()?.into_iter().rev() {
            let dir = self.store.images_root().join(&batch_dir.name);
            let mut files = self
                .store
                .list_dir_files(&batch_dir)?
                .into_iter()
                .map(|name| {
                    let modified = fs::metadata(dir.join(&name).as_std_path())
                        .and_then(|meta| meta.modified())
                        .unwrap_or(SystemTime::UNIX_EPOCH);
                    (modified, name)
                })
                .collect::<Vec<_>>();
            files.sort_by_key(|(modified, name)| Reverse((*modified, name.clone())));
            batches.push(GalleryBatch {
                batch: batch_dir.id,
                name: batch_dir.name,
                files: files.into_iter().map(|(_, name)| name).collect(),
            });
        }
        Ok(batches)
    }

    /// Flattened `batchN/file` entries in display order.
    pub fn entries(&self) -> Result<Vec<String>, BatcherError> {
        Ok(self
            .list()?
            .into_iter()
            .flat_map(|group| {
                let name = group.name;
                group
                    .files
                    .into_iter()
                    .map(move |file| format!("{name}/{file}"))
            })
            .collect())
    }

    /// Resolves a `batchN/file` path to a file under the images root.
    pub fn resolve(&self, relative: &str) -> Result<Utf8PathBuf, BatcherError> {
        let rejected = || BatcherError::InvalidGalleryPath(relative.to_string());
        let path = Utf8Path::new(relative);
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Utf8Component::Normal(part) => parts.push(part),
                Utf8Component::CurDir => {}
                _ => return Err(rejected()),
            }
        }
        let [batch_name, file] = parts.as_slice() else {
            return Err(rejected());
        };
        batch_name.parse::<BatchId>().map_err(|_| rejected())?;
        let full = self.store.images_root().join(batch_name).join(file);
        if !full.as_std_path().is_file() {
            return Err(rejected());
        }
        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn resolve_rejects_escapes() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new(root);
        store.create_batch_dir(BatchId::new(1)).unwrap();
        store.write_image(BatchId::new(1), "a.png", b"png").unwrap();
        let gallery = Gallery::new(store);

        assert!(gallery.resolve("batch1/a.png").unwrap().ends_with("batch1/a.png"));
        for bad in [
            "../batch1/a.png",
            "batch1/../batch1/a.png",
            "/etc/passwd",
            "batch1",
            "other/a.png",
            "batch1/missing.png",
        ] {
            assert_matches!(gallery.resolve(bad), Err(BatcherError::InvalidGalleryPath(_)));
        }
    }

    #[test]
    fn zero_padded_batches_keep_their_directory_name() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::create_dir(root.join("batch007")).unwrap();
        fs::write(root.join("batch007").join("old.png"), b"png").unwrap();
        let gallery = Gallery::new(Store::new(root));

        let batches = gallery.list().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].batch, BatchId::new(7));
        assert_eq!(batches[0].name, "batch007");
        assert_eq!(gallery.entries().unwrap(), vec!["batch007/old.png"]);
        assert!(gallery.resolve("batch007/old.png").unwrap().ends_with("batch007/old.png"));
        assert_matches!(
            gallery.resolve("batch7/old.png"),
            Err(BatcherError::InvalidGalleryPath(_))
        );
    }
}
