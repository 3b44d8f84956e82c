//! Pipeline orchestrator: the fixed stage sequence
//! scrape → raw-load → transform → enrich → verify.
//!
//! Each stage yields a [`StageReport`]; a failure halts every downstream
//! stage so partial data never silently reaches the API layer. The enrich
//! stage skips cleanly when no images have landed.

use std::fmt;

use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::detection::{Enricher, ObjectDetector};
use crate::landing::LandingStore;
use crate::loader::{self, LoadMode};
use crate::scraper::{ChannelClient, ScrapeMode, Scraper};
use crate::transform::{RunMode, Transformer};

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Succeeded => write!(f, "succeeded"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One stage's status plus a human-readable detail line.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: &'static str,
    pub status: StageStatus,
    pub detail: String,
}

/// Summary of one pipeline run, in stage order.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.stages
            .iter()
            .all(|stage| stage.status != StageStatus::Failed)
    }

    /// One line per stage, for the CLI summary.
    pub fn summary(&self) -> String {
        self.stages
            .iter()
            .map(|stage| format!("{:<10} {:<10} {}", stage.stage, stage.status, stage.detail))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn record(&mut self, stage: &'static str, status: StageStatus, detail: String) {
        metrics::counter!(
            "pipeline_stages_total",
            "stage" => stage,
            "status" => status.to_string(),
        )
        .increment(1);
        match status {
            StageStatus::Failed => error!(stage, detail, "pipeline stage failed"),
            StageStatus::Skipped => warn!(stage, detail, "pipeline stage skipped"),
            StageStatus::Succeeded => info!(stage, detail, "pipeline stage complete"),
        }
        self.stages.push(StageReport {
            stage,
            status,
            detail,
        });
    }
}

/// Runs the fixed stage sequence over injected transport and detector seams.
pub struct Pipeline<'a, C: ChannelClient + ?Sized, D: ObjectDetector + ?Sized> {
    config: &'a AppConfig,
    db: &'a DatabaseConnection,
    client: &'a C,
    detector: &'a D,
}

impl<'a, C: ChannelClient + ?Sized, D: ObjectDetector + ?Sized> Pipeline<'a, C, D> {
    pub fn new(
        config: &'a AppConfig,
        db: &'a DatabaseConnection,
        client: &'a C,
        detector: &'a D,
    ) -> Self {
        Self {
            config,
            db,
            client,
            detector,
        }
    }

    /// Execute every stage in order, halting after the first failure.
    pub async fn run(
        &self,
        scrape_mode: ScrapeMode,
        load_mode: LoadMode,
        transform_mode: RunMode,
    ) -> PipelineReport {
        let store = LandingStore::new(
            self.config.scraper.landing_dir.clone(),
            self.config.scraper.image_dir.clone(),
        );
        let mut report = PipelineReport::default();

        // Stage 1: scrape. Per-channel failures are tolerated; a run where
        // every channel failed produced zero usable input and fails.
        let scrape = Scraper::new(self.client, &store, &self.config.scraper)
            .run(scrape_mode)
            .await;
        if scrape.messages_per_channel.is_empty() && !scrape.failed_channels.is_empty() {
            report.record(
                "scrape",
                StageStatus::Failed,
                format!("all channels failed: {}", scrape.failed_channels.join(", ")),
            );
            return report;
        }
        report.record(
            "scrape",
            StageStatus::Succeeded,
            format!(
                "{} messages from {} channel(s), {} failed",
                scrape.total_messages(),
                scrape.messages_per_channel.len(),
                scrape.failed_channels.len()
            ),
        );

        // Stage 2: raw load.
        match loader::load_messages(self.db, &store, load_mode).await {
            Ok(load) => report.record(
                "load-raw",
                StageStatus::Succeeded,
                format!(
                    "{} rows from {} file(s), {} skipped",
                    load.rows_loaded, load.files_loaded, load.files_skipped
                ),
            ),
            Err(err) => {
                report.record("load-raw", StageStatus::Failed, err.to_string());
                return report;
            }
        }

        // Stage 3: transform plus data-quality checks.
        let transformer = Transformer::new(self.db, self.config);
        match transformer.run(transform_mode).await {
            Ok(transform) => report.record(
                "transform",
                StageStatus::Succeeded,
                format!(
                    "{} channels, {} fact rows",
                    transform.dim_channel_rows, transform.fct_message_rows
                ),
            ),
            Err(err) => {
                report.record("transform", StageStatus::Failed, err.to_string());
                return report;
            }
        }

        // Stage 4: enrich. Skips cleanly when nothing has landed.
        if store.discover_images().is_empty() {
            report.record(
                "enrich",
                StageStatus::Skipped,
                "no images found; skipping enrichment".to_string(),
            );
        } else {
            match self.enrich(&store, &transformer, transform_mode).await {
                Ok(detail) => report.record("enrich", StageStatus::Succeeded, detail),
                Err(err) => {
                    report.record("enrich", StageStatus::Failed, err.to_string());
                    return report;
                }
            }
        }

        // Stage 5: verify row counts over the load and fact tables.
        match self.verify().await {
            Ok(detail) => report.record("verify", StageStatus::Succeeded, detail),
            Err(err) => report.record("verify", StageStatus::Failed, err.to_string()),
        }

        report
    }

    /// Detect, load the results, and rebuild the detection fact only.
    async fn enrich(
        &self,
        store: &LandingStore,
        transformer: &Transformer<'_>,
        transform_mode: RunMode,
    ) -> Result<String, anyhow::Error> {
        let enrich = Enricher::new(self.detector, store, &self.config.detector)
            .run()
            .await?;
        let loaded =
            loader::load_detections(self.db, &self.config.detector.detections_path).await?;
        let fact_rows = transformer
            .build_fct_image_detections(transform_mode)
            .await?;
        Ok(format!(
            "{} image(s), {} detection row(s) loaded, {} fact row(s)",
            enrich.images_processed, loaded, fact_rows
        ))
    }

    async fn verify(&self) -> Result<String, sea_orm::DbErr> {
        let mut parts = Vec::new();
        for (table, label) in [
            ("raw.telegram_messages", "raw"),
            ("raw_marts.fct_messages", "facts"),
        ] {
            let row = self
                .db
                .query_one(Statement::from_string(
                    self.db.get_database_backend(),
                    format!("SELECT COUNT(*) AS row_count FROM {}", table),
                ))
                .await?;
            let count: i64 = row
                .map(|row| row.try_get("", "row_count"))
                .transpose()?
                .unwrap_or(0);
            info!(table, count, "verification row count");
            parts.push(format!("{}={}", label, count));
        }
        Ok(parts.join(", "))
    }
}
