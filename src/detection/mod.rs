//! Detection enricher: run object detection over every landed image and emit
//! a flat result table joinable back to messages.
//!
//! The detector itself is an external collaborator behind [`ObjectDetector`];
//! this module owns the image walk, the rule-table categorization, and the
//! CSV output the raw loader picks up.

pub mod categorize;
pub mod sidecar;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DetectorConfig;
use crate::landing::{LandingStore, decode_image_path};

pub use categorize::ImageCategorizer;
pub use sidecar::SidecarDetector;

/// Errors raised by detection and enrichment.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("failed to read image {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("failed to write results {path}: {source}")]
    Results {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize results {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
}

/// One detected object with its confidence score.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f64,
}

/// Detection seam over the pretrained vision model.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect(&self, image: &Path) -> Result<Vec<Detection>, DetectorError>;
}

/// One output row: a detected object carrying the image-level category.
/// An image with zero detections emits a single placeholder row with an
/// empty class and confidence 0.0 so `other`-category images stay visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRow {
    pub message_id: i64,
    pub channel_name: String,
    pub detected_class: String,
    pub confidence_score: f64,
    pub image_category: String,
    pub scraped_at: DateTime<Utc>,
}

/// Outcome of one enrichment run.
#[derive(Debug, Default)]
pub struct EnrichReport {
    pub images_processed: usize,
    pub images_skipped: usize,
    pub rows_written: usize,
}

/// Enrichment orchestrator: detect, categorize, and write the result CSV.
pub struct Enricher<'a, D: ObjectDetector + ?Sized> {
    detector: &'a D,
    store: &'a LandingStore,
    config: &'a DetectorConfig,
}

impl<'a, D: ObjectDetector + ?Sized> Enricher<'a, D> {
    pub fn new(detector: &'a D, store: &'a LandingStore, config: &'a DetectorConfig) -> Self {
        Self {
            detector,
            store,
            config,
        }
    }

    /// Run detection over every landed image. A failed detection yields an
    /// empty detection set for that image, not an aborted run; an
    /// undecodable path is skipped.
    pub async fn run(&self) -> Result<EnrichReport, DetectorError> {
        let categorizer =
            ImageCategorizer::new(&self.config.person_classes, &self.config.product_classes);
        let scraped_at = Utc::now();
        let mut report = EnrichReport::default();
        let mut rows = Vec::new();

        for image in self.store.discover_images() {
            let Some((channel_name, message_id)) = decode_image_path(&image) else {
                warn!(path = %image.display(), "skipping image with undecodable path");
                report.images_skipped += 1;
                continue;
            };

            let detections = match self.detector.detect(&image).await {
                Ok(detections) => detections,
                Err(err) => {
                    warn!(path = %image.display(), error = %err, "detection failed, treating as empty");
                    Vec::new()
                }
            };

            let category = categorizer.categorize(&detections);
            if detections.is_empty() {
                rows.push(DetectionRow {
                    message_id,
                    channel_name: channel_name.clone(),
                    detected_class: String::new(),
                    confidence_score: 0.0,
                    image_category: category.to_string(),
                    scraped_at,
                });
            } else {
                for detection in &detections {
                    rows.push(DetectionRow {
                        message_id,
                        channel_name: channel_name.clone(),
                        detected_class: detection.class_name.clone(),
                        confidence_score: detection.confidence,
                        image_category: category.to_string(),
                        scraped_at,
                    });
                }
            }
            report.images_processed += 1;
        }

        report.rows_written = rows.len();
        self.write_results(&rows)?;
        metrics::counter!("enricher_rows_total").increment(rows.len() as u64);
        info!(
            images = report.images_processed,
            rows = report.rows_written,
            path = %self.config.detections_path.display(),
            "saved detection results"
        );

        Ok(report)
    }

    fn write_results(&self, rows: &[DetectionRow]) -> Result<(), DetectorError> {
        let path = &self.config.detections_path;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DetectorError::Results {
                path: path.clone(),
                source,
            })?;
        }
        let mut writer = csv::Writer::from_path(path).map_err(|source| DetectorError::Csv {
            path: path.clone(),
            source,
        })?;
        for row in rows {
            writer.serialize(row).map_err(|source| DetectorError::Csv {
                path: path.clone(),
                source,
            })?;
        }
        writer.flush().map_err(|source| DetectorError::Results {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }
}

/// Read an enricher result CSV back as rows, for the raw loader.
pub fn read_results(path: &Path) -> Result<Vec<DetectionRow>, DetectorError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| DetectorError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: DetectionRow = result.map_err(|source| DetectorError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(row);
    }
    Ok(rows)
}
