//! Integration tests for the detection sidecar client against a mock server.

use medwarehouse::detection::{DetectorError, ObjectDetector, SidecarDetector};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fake_image(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("42.jpg");
    std::fs::write(&path, b"not-really-a-jpeg").unwrap();
    path
}

#[tokio::test]
async fn detect_parses_sidecar_detections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/detect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "detections": [
                {"class_name": "person", "confidence": 0.91},
                {"class_name": "bottle", "confidence": 0.74}
            ]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let detector = SidecarDetector::new(&format!("{}/detect", server.uri()), "yolov8n");
    let detections = detector.detect(&fake_image(&dir)).await.expect("detections");

    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].class_name, "person");
    assert!((detections[1].confidence - 0.74).abs() < f64::EPSILON);
}

#[tokio::test]
async fn empty_response_body_yields_no_detections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/detect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let detector = SidecarDetector::new(&format!("{}/detect", server.uri()), "yolov8n");
    let detections = detector.detect(&fake_image(&dir)).await.expect("detections");
    assert!(detections.is_empty());
}

#[tokio::test]
async fn sidecar_failure_maps_to_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/detect"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let detector = SidecarDetector::new(&format!("{}/detect", server.uri()), "yolov8n");
    let err = detector
        .detect(&fake_image(&dir))
        .await
        .expect_err("sidecar failure");

    assert!(matches!(err, DetectorError::Http { status: 503, .. }));
}

#[tokio::test]
async fn malformed_response_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/detect"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let detector = SidecarDetector::new(&format!("{}/detect", server.uri()), "yolov8n");
    let err = detector
        .detect(&fake_image(&dir))
        .await
        .expect_err("malformed response");

    assert!(matches!(err, DetectorError::Malformed(_)));
}

#[tokio::test]
async fn missing_image_is_an_io_error() {
    let detector = SidecarDetector::new("http://127.0.0.1:1/detect", "yolov8n");
    let err = detector
        .detect(std::path::Path::new("/nonexistent/1.jpg"))
        .await
        .expect_err("missing image");
    assert!(matches!(err, DetectorError::Io { .. }));
}
