use std::fs;
use std::time::{Duration, SystemTime};

use camino::Utf8PathBuf;

use image_batcher::domain::BatchId;
use image_batcher::gallery::Gallery;
use image_batcher::store::Store;

fn set_mtime(path: &Utf8PathBuf, secs: u64) {
    let file = fs::File::options().write(true).open(path.as_std_path()).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

#[test]
fn newest_batch_and_file_first() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new(root);
    for id in [2, 9, 10] {
        store.create_batch_dir(BatchId::new(id)).unwrap();
    }
    let older = store.write_image(BatchId::new(10), "z-old.png", b"1").unwrap();
    let newer = store.write_image(BatchId::new(10), "a-new.png", b"2").unwrap();
    set_mtime(&older, 1_000);
    set_mtime(&newer, 2_000);
    store.write_image(BatchId::new(2), "x.gif", b"3").unwrap();
    fs::write(store.images_root().join("fetch_images.json"), b"[]").unwrap();

    let gallery = Gallery::new(store);
    let batches = gallery.list().unwrap();
    let order: Vec<u64> = batches.iter().map(|group| group.batch.value()).collect();
    assert_eq!(order, vec![10, 9, 2]);
    assert_eq!(batches[0].files, vec!["a-new.png", "z-old.png"]);
    assert!(batches[1].files.is_empty());

    assert_eq!(
        gallery.entries().unwrap(),
        vec!["batch10/a-new.png", "batch10/z-old.png", "batch2/x.gif"]
    );
}

#[test]
fn empty_root_lists_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("missing")).unwrap();
    let gallery = Gallery::new(Store::new(root));
    assert!(gallery.list().unwrap().is_empty());
}
