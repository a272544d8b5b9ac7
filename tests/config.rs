use std::time::Duration;

use assert_matches::assert_matches;

use image_batcher::config::{Config, ConfigLoader, ConfigOverrides};
use image_batcher::error::BatcherError;

#[test]
fn overrides_win_over_file_values() {
    let config: Config = serde_json::from_str(
        r#"{
            "endpoint": "http://file/images",
            "images_root": "/data/images",
            "interval_secs": 300,
            "request_timeout_secs": 5
        }"#,
    )
    .unwrap();
    let overrides = ConfigOverrides {
        endpoint: Some("http://cli/images".to_string()),
        images_root: None,
        interval_secs: Some(10),
    };

    let resolved = ConfigLoader::resolve_config(config, overrides).unwrap();
    assert_eq!(resolved.endpoint().unwrap(), "http://cli/images");
    assert_eq!(resolved.images_root, "/data/images");
    assert_eq!(resolved.ledger_path, "/data/images/fetch_images.json");
    assert_eq!(resolved.interval, Duration::from_secs(10));
    assert_eq!(resolved.request_timeout, Duration::from_secs(5));
}

#[test]
fn explicit_ledger_path_is_kept() {
    let config: Config =
        serde_json::from_str(r#"{"endpoint": "http://x", "ledger_path": "/var/lib/ledger.json"}"#)
            .unwrap();
    let resolved = ConfigLoader::resolve_config(config, ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.ledger_path, "/var/lib/ledger.json");
    assert_eq!(resolved.images_root, "static/images");
}

#[test]
fn load_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("image-batcher.json");
    std::fs::write(&path, r#"{"endpoint": "http://backend/list"}"#).unwrap();

    let resolved =
        ConfigLoader::resolve(Some(path.to_str().unwrap()), ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.endpoint().unwrap(), "http://backend/list");
}

#[test]
fn unreadable_or_invalid_files_fail() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("nope.json");
    let err = ConfigLoader::resolve(Some(missing.to_str().unwrap()), ConfigOverrides::default())
        .unwrap_err();
    assert_matches!(err, BatcherError::ConfigRead(_));

    let broken = temp.path().join("broken.json");
    std::fs::write(&broken, "{endpoint").unwrap();
    let err = ConfigLoader::resolve(Some(broken.to_str().unwrap()), ConfigOverrides::default())
        .unwrap_err();
    assert_matches!(err, BatcherError::ConfigParse(_));
}
