//! Landing store: the filesystem area holding scraped output before load.
//!
//! Messages land as one JSON array per (channel, day) under the landing
//! directory; images land under `<image_dir>/<channel>/<message_id>.jpg`.
//! Everything downstream (raw loader, detection enricher) reads these
//! layouts back, so path encoding/decoding lives here.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

/// File name of the per-channel scrape high-water-mark state, kept out of
/// batch discovery by its leading dot.
const SCRAPE_STATE_FILE: &str = ".scrape_state.json";

/// Errors raised by landing-store IO.
#[derive(Debug, Error)]
pub enum LandingError {
    #[error("failed to read landing file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write landing file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("landing file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// One scraped message record as persisted in a landing batch.
///
/// `views`/`forwards` default to zero when the provider omits them; the
/// remaining required fields are enforced by [`ParsedBatch::from_values`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: i64,
    pub channel_name: String,
    pub message_date: DateTime<Utc>,
    #[serde(default)]
    pub message_text: Option<String>,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub forwards: i64,
    #[serde(default)]
    pub scraped_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    /// Business-rule validation beyond what the typed parse enforces.
    fn is_well_formed(&self) -> bool {
        !self.channel_name.trim().is_empty() && self.views >= 0 && self.forwards >= 0
    }
}

/// Result of parsing one landing batch: well-formed records plus a count of
/// rows rejected by the validation step.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub records: Vec<MessageRecord>,
    pub rejected: usize,
}

impl ParsedBatch {
    /// Classify each raw JSON row as well-formed or rejected. Rejected rows
    /// are logged and excluded, never propagated downstream.
    pub fn from_values(path: &Path, values: Vec<serde_json::Value>) -> Self {
        let mut batch = ParsedBatch::default();
        for (index, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<MessageRecord>(value) {
                Ok(record) if record.is_well_formed() => batch.records.push(record),
                Ok(record) => {
                    tracing::warn!(
                        path = %path.display(),
                        index,
                        message_id = record.message_id,
                        "rejected landing row failing validation"
                    );
                    batch.rejected += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        index,
                        error = %err,
                        "rejected malformed landing row"
                    );
                    batch.rejected += 1;
                }
            }
        }
        batch
    }
}

/// Per-channel scrape high-water marks, persisted between runs so
/// incremental scrapes only request newer messages.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ScrapeState {
    #[serde(default)]
    pub last_message_ids: BTreeMap<String, i64>,
}

/// Filesystem layout of the landing area.
#[derive(Debug, Clone)]
pub struct LandingStore {
    landing_dir: PathBuf,
    image_dir: PathBuf,
}

impl LandingStore {
    pub fn new<L: Into<PathBuf>, I: Into<PathBuf>>(landing_dir: L, image_dir: I) -> Self {
        Self {
            landing_dir: landing_dir.into(),
            image_dir: image_dir.into(),
        }
    }

    pub fn landing_dir(&self) -> &Path {
        &self.landing_dir
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Path of the JSON batch for one (channel, day).
    pub fn batch_path(&self, day: NaiveDate, channel: &str) -> PathBuf {
        self.landing_dir
            .join(day.format("%Y-%m-%d").to_string())
            .join(format!("{}.json", channel))
    }

    /// Path an image for (channel, message id) lands at.
    pub fn image_path(&self, channel: &str, message_id: i64) -> PathBuf {
        self.image_dir
            .join(channel)
            .join(format!("{}.jpg", message_id))
    }

    /// Persist one (channel, day) batch as a JSON array.
    pub fn write_batch(
        &self,
        channel: &str,
        day: NaiveDate,
        records: &[MessageRecord],
    ) -> Result<PathBuf, LandingError> {
        let path = self.batch_path(day, channel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LandingError::Write {
                path: path.clone(),
                source,
            })?;
        }
        let body =
            serde_json::to_vec_pretty(records).map_err(|source| LandingError::Parse {
                path: path.clone(),
                source,
            })?;
        fs::write(&path, body).map_err(|source| LandingError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Read and validate one landing batch.
    pub fn read_batch(&self, path: &Path) -> Result<ParsedBatch, LandingError> {
        let body = fs::read_to_string(path).map_err(|source| LandingError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let values: Vec<serde_json::Value> =
            serde_json::from_str(&body).map_err(|source| LandingError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(ParsedBatch::from_values(path, values))
    }

    /// Every landing batch file, recursively, in stable order.
    pub fn discover_batches(&self) -> Vec<PathBuf> {
        let mut batches: Vec<PathBuf> = WalkDir::new(&self.landing_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension().is_some_and(|ext| ext == "json")
                    && !path
                        .file_name()
                        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
            })
            .collect();
        batches.sort();
        batches
    }

    /// Every landed image, recursively.
    pub fn discover_images(&self) -> Vec<PathBuf> {
        let mut images: Vec<PathBuf> = WalkDir::new(&self.image_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "jpg"))
            .collect();
        images.sort();
        images
    }

    /// Load the scrape high-water-mark state, defaulting to empty.
    pub fn load_scrape_state(&self) -> ScrapeState {
        let path = self.landing_dir.join(SCRAPE_STATE_FILE);
        match fs::read_to_string(&path) {
            Ok(body) => serde_json::from_str(&body).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "scrape state unreadable, starting fresh");
                ScrapeState::default()
            }),
            Err(_) => ScrapeState::default(),
        }
    }

    /// Persist the scrape high-water-mark state.
    pub fn save_scrape_state(&self, state: &ScrapeState) -> Result<(), LandingError> {
        let path = self.landing_dir.join(SCRAPE_STATE_FILE);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LandingError::Write {
                path: path.clone(),
                source,
            })?;
        }
        let body = serde_json::to_vec_pretty(state).map_err(|source| LandingError::Parse {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, body).map_err(|source| LandingError::Write { path, source })
    }
}

/// Normalize a channel reference (t.me URL, @handle, bare name) to the bare
/// channel name used in landing paths and the warehouse.
pub fn sanitize_channel_name(reference: &str) -> String {
    reference
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim_start_matches('@')
        .to_string()
}

/// Decode `(channel, message_id)` from a landed image path of the form
/// `<image_dir>/<channel>/<message_id>.jpg`.
pub fn decode_image_path(path: &Path) -> Option<(String, i64)> {
    let message_id = path.file_stem()?.to_str()?.parse::<i64>().ok()?;
    let channel = path.parent()?.file_name()?.to_str()?.to_string();
    if channel.is_empty() {
        return None;
    }
    Some((channel, message_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(id: i64) -> MessageRecord {
        MessageRecord {
            message_id: id,
            channel_name: "CheMed123".to_string(),
            message_date: Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
            message_text: Some("Paracetamol 500mg available".to_string()),
            has_media: false,
            image_path: None,
            views: 10,
            forwards: 1,
            scraped_at: Some(Utc::now()),
        }
    }

    #[test]
    fn sanitize_handles_url_handle_and_trailing_slash() {
        assert_eq!(sanitize_channel_name("https://t.me/CheMed123"), "CheMed123");
        assert_eq!(sanitize_channel_name("@CheMed123"), "CheMed123");
        assert_eq!(sanitize_channel_name("CheMed123/"), "CheMed123");
    }

    #[test]
    fn image_path_round_trips() {
        let store = LandingStore::new("data/raw/telegram_messages", "data/raw/images");
        let path = store.image_path("tikvahpharma", 42);
        assert_eq!(
            decode_image_path(&path),
            Some(("tikvahpharma".to_string(), 42))
        );
    }

    #[test]
    fn non_numeric_image_stem_is_rejected() {
        assert_eq!(decode_image_path(Path::new("images/ch/cover.jpg")), None);
    }

    #[test]
    fn missing_fields_default_and_required_fields_reject() {
        let values = vec![
            json!({
                "message_id": 1,
                "channel_name": "CheMed123",
                "message_date": "2025-06-01T09:00:00Z"
            }),
            json!({"channel_name": "CheMed123"}),
        ];
        let batch = ParsedBatch::from_values(Path::new("test.json"), values);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.rejected, 1);
        assert_eq!(batch.records[0].views, 0);
        assert_eq!(batch.records[0].forwards, 0);
        assert!(batch.records[0].message_text.is_none());
    }

    #[test]
    fn negative_counters_are_rejected() {
        let values = vec![json!({
            "message_id": 1,
            "channel_name": "CheMed123",
            "message_date": "2025-06-01T09:00:00Z",
            "views": -5
        })];
        let batch = ParsedBatch::from_values(Path::new("test.json"), values);
        assert!(batch.records.is_empty());
        assert_eq!(batch.rejected, 1);
    }

    #[test]
    fn batch_write_read_and_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let store = LandingStore::new(dir.path().join("messages"), dir.path().join("images"));
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        store
            .write_batch("CheMed123", day, &[record(1), record(2)])
            .unwrap();
        store
            .save_scrape_state(&ScrapeState {
                last_message_ids: BTreeMap::from([("CheMed123".to_string(), 2)]),
            })
            .unwrap();

        let batches = store.discover_batches();
        assert_eq!(batches.len(), 1, "state file must not count as a batch");

        let parsed = store.read_batch(&batches[0]).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.rejected, 0);

        let state = store.load_scrape_state();
        assert_eq!(state.last_message_ids.get("CheMed123"), Some(&2));
    }
}
