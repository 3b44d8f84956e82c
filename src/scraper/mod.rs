//! Channel scraping: fetch messages and media through the transport trait
//! and persist them into the landing store.
//!
//! The Telegram wire protocol itself is an external collaborator behind
//! [`ChannelClient`]; this module owns the run loop, rate-limit cooperation,
//! per-channel failure isolation, and the landing layout.

pub mod gateway;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::ScraperConfig;
use crate::landing::{LandingStore, MessageRecord, sanitize_channel_name};

pub use gateway::GatewayClient;

/// Transport-level errors surfaced by [`ChannelClient`] implementations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Provider-side throttling; the caller must back off for the indicated
    /// duration before retrying, not abandon the run.
    #[error("flood wait for {retry_after_secs}s")]
    FloodWait { retry_after_secs: u64 },
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// One message as returned by the transport.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub text: Option<String>,
    pub has_photo: bool,
    pub views: Option<i64>,
    pub forwards: Option<i64>,
}

/// Transport seam for fetching channel history and media.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Fetch up to `limit` messages, newest first, optionally only those
    /// with an id greater than `min_id`.
    async fn fetch_messages(
        &self,
        channel: &str,
        limit: usize,
        min_id: Option<i64>,
    ) -> Result<Vec<ChannelMessage>, ClientError>;

    /// Download the photo attached to a message to `dest`. Returns false if
    /// the message has no downloadable photo.
    async fn download_photo(
        &self,
        channel: &str,
        message_id: i64,
        dest: &std::path::Path,
    ) -> Result<bool, ClientError>;
}

/// Scrape scope: everything, or only messages past the stored high-water mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeMode {
    Full,
    Incremental,
}

/// Outcome of one scrape run.
#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub messages_per_channel: BTreeMap<String, usize>,
    pub failed_channels: Vec<String>,
}

impl ScrapeReport {
    pub fn total_messages(&self) -> usize {
        self.messages_per_channel.values().sum()
    }
}

/// Scrape orchestrator: one sequential pass over the configured channels.
pub struct Scraper<'a, C: ChannelClient + ?Sized> {
    client: &'a C,
    store: &'a LandingStore,
    config: &'a ScraperConfig,
}

impl<'a, C: ChannelClient + ?Sized> Scraper<'a, C> {
    pub fn new(client: &'a C, store: &'a LandingStore, config: &'a ScraperConfig) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// Scrape every configured channel. A single channel's failure is logged
    /// and does not abort the remaining channels.
    pub async fn run(&self, mode: ScrapeMode) -> ScrapeReport {
        let mut report = ScrapeReport::default();
        let mut state = self.store.load_scrape_state();
        let scraped_at = Utc::now();

        for (index, reference) in self.config.channels.iter().enumerate() {
            let channel = sanitize_channel_name(reference);
            if channel.is_empty() {
                warn!(reference, "skipping unparseable channel reference");
                continue;
            }

            let min_id = match mode {
                ScrapeMode::Incremental => state.last_message_ids.get(&channel).copied(),
                ScrapeMode::Full => None,
            };

            match self.scrape_channel(&channel, min_id, scraped_at).await {
                Ok(records) => {
                    if let Some(max_id) = records.iter().map(|r| r.message_id).max() {
                        let entry = state.last_message_ids.entry(channel.clone()).or_insert(0);
                        *entry = (*entry).max(max_id);
                    }
                    metrics::counter!("scraper_messages_total").increment(records.len() as u64);
                    info!(channel, count = records.len(), "archived channel batch");
                    report.messages_per_channel.insert(channel, records.len());
                }
                Err(err) => {
                    error!(channel, error = %err, "channel scrape failed, continuing");
                    metrics::counter!("scraper_channel_failures_total").increment(1);
                    report.failed_channels.push(channel);
                }
            }

            // Cooperative delay between channels to stay under provider limits.
            if index + 1 < self.config.channels.len() {
                sleep(Duration::from_secs(self.config.channel_delay_seconds)).await;
            }
        }

        if let Err(err) = self.store.save_scrape_state(&state) {
            warn!(error = %err, "failed to persist scrape state");
        }

        report
    }

    /// Scrape one channel, retrying once after a provider flood-wait.
    async fn scrape_channel(
        &self,
        channel: &str,
        min_id: Option<i64>,
        scraped_at: DateTime<Utc>,
    ) -> Result<Vec<MessageRecord>, anyhow::Error> {
        let messages = loop {
            match self
                .client
                .fetch_messages(channel, self.config.message_limit, min_id)
                .await
            {
                Ok(messages) => break messages,
                Err(ClientError::FloodWait { retry_after_secs }) => {
                    let jitter_ms = rand::thread_rng().gen_range(0..1000);
                    warn!(
                        channel,
                        retry_after_secs, "provider flood wait, backing off before retry"
                    );
                    sleep(Duration::from_secs(retry_after_secs) + Duration::from_millis(jitter_ms))
                        .await;
                    // Retry after the indicated cooldown; a second flood wait
                    // falls through to the error arm below.
                    match self
                        .client
                        .fetch_messages(channel, self.config.message_limit, min_id)
                        .await
                    {
                        Ok(messages) => break messages,
                        Err(err) => return Err(err.into()),
                    }
                }
                Err(err) => return Err(err.into()),
            }
        };

        let mut records = Vec::with_capacity(messages.len());
        for message in messages {
            let image_path = if message.has_photo {
                self.download_image(channel, message.id).await
            } else {
                None
            };

            records.push(MessageRecord {
                message_id: message.id,
                channel_name: channel.to_string(),
                message_date: message.date,
                message_text: message.text,
                has_media: message.has_photo,
                image_path,
                views: message.views.unwrap_or(0).max(0),
                forwards: message.forwards.unwrap_or(0).max(0),
                scraped_at: Some(scraped_at),
            });
        }

        for (day, batch) in group_by_day(&records) {
            self.store.write_batch(channel, day, &batch)?;
        }

        Ok(records)
    }

    /// Download one message photo; a failed download degrades to a record
    /// without an image path rather than failing the channel.
    async fn download_image(&self, channel: &str, message_id: i64) -> Option<String> {
        let dest = self.store.image_path(channel, message_id);
        if let Some(parent) = dest.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                error!(channel, message_id, error = %err, "cannot create image directory");
                return None;
            }
        }
        match self.client.download_photo(channel, message_id, &dest).await {
            Ok(true) => Some(dest.to_string_lossy().into_owned()),
            Ok(false) => None,
            Err(err) => {
                error!(channel, message_id, error = %err, "media download failed");
                None
            }
        }
    }
}

/// Split a channel's records into (day, batch) groups for landing files.
fn group_by_day(records: &[MessageRecord]) -> BTreeMap<NaiveDate, Vec<MessageRecord>> {
    let mut groups: BTreeMap<NaiveDate, Vec<MessageRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.message_date.date_naive())
            .or_default()
            .push(record.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: i64, day: u32) -> MessageRecord {
        MessageRecord {
            message_id: id,
            channel_name: "CheMed123".to_string(),
            message_date: Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap(),
            message_text: None,
            has_media: false,
            image_path: None,
            views: 0,
            forwards: 0,
            scraped_at: None,
        }
    }

    #[test]
    fn records_group_into_one_batch_per_day() {
        let records = vec![record(1, 1), record(2, 1), record(3, 2)];
        let groups = group_by_day(&records);

        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[&NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()].len(),
            2
        );
        assert_eq!(
            groups[&NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()].len(),
            1
        );
    }
}
