//! Integration tests for the detection enricher over a stubbed detector and
//! a temporary landing area.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use medwarehouse::config::DetectorConfig;
use medwarehouse::detection::{self, Detection, DetectorError, Enricher, ObjectDetector};
use medwarehouse::landing::LandingStore;
use tempfile::TempDir;

/// Detector stub keyed by image file stem.
struct StubDetector {
    by_stem: BTreeMap<String, Vec<Detection>>,
    fail_stems: Vec<String>,
}

#[async_trait]
impl ObjectDetector for StubDetector {
    async fn detect(&self, image: &Path) -> Result<Vec<Detection>, DetectorError> {
        let stem = image
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if self.fail_stems.contains(&stem) {
            return Err(DetectorError::Network("sidecar unreachable".to_string()));
        }
        Ok(self.by_stem.get(&stem).cloned().unwrap_or_default())
    }
}

fn detection(class: &str, confidence: f64) -> Detection {
    Detection {
        class_name: class.to_string(),
        confidence,
    }
}

fn setup(dir: &TempDir) -> (LandingStore, DetectorConfig) {
    let store = LandingStore::new(dir.path().join("messages"), dir.path().join("images"));
    let config = DetectorConfig {
        detections_path: dir.path().join("processed/yolo_detections.csv"),
        ..DetectorConfig::default()
    };
    (store, config)
}

fn land_image(store: &LandingStore, channel: &str, message_id: i64) {
    let path = store.image_path(channel, message_id);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"jpeg").unwrap();
}

#[tokio::test]
async fn one_row_per_detection_carrying_the_image_category() {
    let dir = TempDir::new().unwrap();
    let (store, config) = setup(&dir);
    land_image(&store, "CheMed123", 10);

    let detector = StubDetector {
        by_stem: BTreeMap::from([(
            "10".to_string(),
            vec![detection("person", 0.91), detection("bottle", 0.85)],
        )]),
        fail_stems: Vec::new(),
    };

    let report = Enricher::new(&detector, &store, &config)
        .run()
        .await
        .expect("enrichment runs");
    assert_eq!(report.images_processed, 1);
    assert_eq!(report.rows_written, 2);

    let rows = detection::read_results(&config.detections_path).expect("results readable");
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.message_id, 10);
        assert_eq!(row.channel_name, "CheMed123");
        assert_eq!(row.image_category, "promotional");
    }
    let classes: Vec<&str> = rows.iter().map(|r| r.detected_class.as_str()).collect();
    assert!(classes.contains(&"person") && classes.contains(&"bottle"));
}

#[tokio::test]
async fn zero_detection_image_emits_a_placeholder_row() {
    let dir = TempDir::new().unwrap();
    let (store, config) = setup(&dir);
    land_image(&store, "tikvahpharma", 7);

    let detector = StubDetector {
        by_stem: BTreeMap::new(),
        fail_stems: Vec::new(),
    };

    let report = Enricher::new(&detector, &store, &config)
        .run()
        .await
        .expect("enrichment runs");
    assert_eq!(report.rows_written, 1);

    let rows = detection::read_results(&config.detections_path).unwrap();
    assert_eq!(rows[0].detected_class, "");
    assert_eq!(rows[0].confidence_score, 0.0);
    assert_eq!(rows[0].image_category, "other");
}

#[tokio::test]
async fn detector_failure_degrades_to_empty_detections() {
    let dir = TempDir::new().unwrap();
    let (store, config) = setup(&dir);
    land_image(&store, "CheMed123", 1);
    land_image(&store, "CheMed123", 2);

    let detector = StubDetector {
        by_stem: BTreeMap::from([("2".to_string(), vec![detection("cup", 0.8)])]),
        fail_stems: vec!["1".to_string()],
    };

    let report = Enricher::new(&detector, &store, &config)
        .run()
        .await
        .expect("run survives a failed detection");
    assert_eq!(report.images_processed, 2);

    let rows = detection::read_results(&config.detections_path).unwrap();
    let failed: Vec<_> = rows.iter().filter(|r| r.message_id == 1).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].image_category, "other");

    let detected: Vec<_> = rows.iter().filter(|r| r.message_id == 2).collect();
    assert_eq!(detected[0].image_category, "product_display");
}

#[tokio::test]
async fn undecodable_image_paths_are_skipped() {
    let dir = TempDir::new().unwrap();
    let (store, config) = setup(&dir);
    land_image(&store, "CheMed123", 3);

    // A stray file whose stem is not a message id.
    let stray = dir.path().join("images/CheMed123/cover-art.jpg");
    std::fs::write(&stray, b"jpeg").unwrap();

    let detector = StubDetector {
        by_stem: BTreeMap::new(),
        fail_stems: Vec::new(),
    };

    let report = Enricher::new(&detector, &store, &config)
        .run()
        .await
        .expect("enrichment runs");
    assert_eq!(report.images_processed, 1);
    assert_eq!(report.images_skipped, 1);
}
