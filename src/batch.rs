use camino::Utf8PathBuf;
use tracing::info;

use crate::domain::BatchId;
use crate::error::BatcherError;
use crate::store::Store;

/// Hands out batch ids. The current batch is always recomputed from the
/// directories on disk, never cached, so ids survive restarts and crashes
/// between allocation and the first write.
#[derive(Debug, Clone)]
pub struct BatchAllocator {
    store: Store,
}

impl BatchAllocator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Highest existing batch id, or [`BatchId::EMPTY`] when there is none.
    pub fn current_batch(&self) -> Result<BatchId, BatcherError> {
        Ok(self
            .store
            .list_batches()?
            .last()
            .copied()
            .unwrap_or(BatchId::EMPTY))
    }

    /// Creates the directory for `current_batch() + 1` and returns its id.
    pub fn allocate_next(&self) -> Result<(BatchId, Utf8PathBuf), BatcherError> {
        let current = self.current_batch()?;
        let next = current
            .next()
            .ok_or_else(|| BatcherError::InvalidBatchName(format!("no batch id after {current}")))?;
        let dir = self.store.create_batch_dir(next)?;
        info!(batch = %next, "allocated batch");
        Ok((next, dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn first_allocation_is_batch_one() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("images")).unwrap();
        let allocator = BatchAllocator::new(Store::new(root));

        assert_eq!(allocator.current_batch().unwrap(), BatchId::EMPTY);
        let (batch, dir) = allocator.allocate_next().unwrap();
        assert_eq!(batch, BatchId::new(1));
        assert!(dir.as_std_path().is_dir());
        assert!(dir.ends_with("batch1"));
    }

    #[test]
    fn allocation_follows_highest_existing_batch() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new(root);
        store.create_batch_dir(BatchId::new(3)).unwrap();
        store.create_batch_dir(BatchId::new(11)).unwrap();

        let allocator = BatchAllocator::new(store);
        assert_eq!(allocator.current_batch().unwrap(), BatchId::new(11));
        assert_eq!(allocator.allocate_next().unwrap().0, BatchId::new(12));
        assert_eq!(allocator.allocate_next().unwrap().0, BatchId::new(13));
    }

    #[test]
    fn exhausted_id_space_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        std::fs::create_dir(root.join("batch18446744073709551615")).unwrap();

        let allocator = BatchAllocator::new(Store::new(root.clone()));
        assert_eq!(allocator.current_batch().unwrap(), BatchId::new(u64::MAX));
        assert_matches!(allocator.allocate_next(), Err(BatcherError::InvalidBatchName(_)));
        assert_eq!(std::fs::read_dir(root.as_std_path()).unwrap().count(), 1);
    }

    #[test]
    fn zero_padded_batch_counts_toward_the_next_id() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        std::fs::create_dir(root.join("batch007")).unwrap();

        let allocator = BatchAllocator::new(Store::new(root));
        assert_eq!(allocator.allocate_next().unwrap().0, BatchId::new(8));
    }
}
