//! Sessions backed by an on-disk album

mod common;

use common::{FakeView, BLUE, RED};
use paperclip_screenshot::{
    RecordMetadata, ScreenshotError, ScreenshotSession, DEFAULT_CONFIG_NAME, METADATA_FILE_NAME,
};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_create_writes_tiles_and_documents() {
    let temp = tempdir().unwrap();
    let session = ScreenshotSession::create(temp.path()).expect("Failed to create session");
    let album_dir = temp.path().join("screenshots").join("default");

    let view = Arc::new(
        FakeView::new(600, 300)
            .color(RED)
            .child(FakeView::new(50, 50).at(520, 0).color(BLUE)),
    );
    session
        .snap(view)
        .set_name("banner")
        .unwrap()
        .record()
        .expect("Failed to record");
    session.flush().expect("Failed to flush");

    let first = image::open(album_dir.join("banner_0_0.png")).unwrap().to_rgba8();
    let second = image::open(album_dir.join("banner_1_0.png")).unwrap().to_rgba8();
    assert_eq!(first.dimensions(), (512, 300));
    assert_eq!(second.dimensions(), (88, 300));
    assert_eq!(*second.get_pixel(8, 0), BLUE);
    assert_eq!(*second.get_pixel(7, 0), RED);

    let dump: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(album_dir.join("banner_dump.json")).unwrap())
            .unwrap();
    assert_eq!(dump["version"], 1);
    assert_eq!(dump["viewHierarchy"]["width"], 600);
    assert!(album_dir.join("banner_issues.json").exists());

    let records: Vec<RecordMetadata> =
        serde_json::from_str(&fs::read_to_string(album_dir.join(METADATA_FILE_NAME)).unwrap())
            .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "banner");
    assert_eq!(records[0].tiling.get_at(1, 0), Some("banner_1_0.png"));
}

#[test]
fn test_create_reads_config_file() {
    let temp = tempdir().unwrap();
    let out = temp.path().join("out");
    fs::write(
        temp.path().join(DEFAULT_CONFIG_NAME),
        serde_json::json!({
            "tileSize": 100,
            "albumName": "nightly",
            "albumDir": out,
        })
        .to_string(),
    )
    .unwrap();

    let session = ScreenshotSession::create(temp.path()).unwrap();
    assert_eq!(session.tile_size(), 100);
    assert_eq!(session.config().album_name, "nightly");

    let mut record = session.snap(Arc::new(FakeView::new(150, 50).color(RED)));
    record.set_name("strip").unwrap().record().unwrap();
    assert_eq!((record.tiling().width(), record.tiling().height()), (2, 1));

    assert!(out.join("nightly").join("strip_0_0.png").exists());
    assert!(out.join("nightly").join("strip_1_0.png").exists());
}

#[test]
fn test_create_cleans_previous_run() {
    let temp = tempdir().unwrap();
    let album_dir = temp.path().join("screenshots").join("default");
    fs::create_dir_all(&album_dir).unwrap();
    fs::write(album_dir.join("stale_0_0.png"), b"stale").unwrap();

    let _session = ScreenshotSession::create(temp.path()).unwrap();
    assert!(album_dir.exists());
    assert!(!album_dir.join("stale_0_0.png").exists());
}

#[test]
fn test_create_rejects_invalid_config() {
    let temp = tempdir().unwrap();
    fs::write(
        temp.path().join(DEFAULT_CONFIG_NAME),
        r#"{"albumName": "a/b"}"#,
    )
    .unwrap();

    assert!(matches!(
        ScreenshotSession::create(temp.path()),
        Err(ScreenshotError::Config(_))
    ));
}
