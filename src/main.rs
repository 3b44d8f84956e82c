//! # Medical Telegram Warehouse Entry Point
//!
//! CLI for the warehouse service: serve the analytics API, run individual
//! pipeline steps, or run the whole pipeline in order.

use anyhow::{anyhow, bail};
use clap::{Parser, Subcommand};

use medwarehouse::config::ConfigLoader;
use medwarehouse::detection::{Enricher, SidecarDetector};
use medwarehouse::landing::LandingStore;
use medwarehouse::loader::{self, LoadMode};
use medwarehouse::migration::{Migrator, MigratorTrait};
use medwarehouse::pipeline::Pipeline;
use medwarehouse::scraper::{GatewayClient, ScrapeMode, Scraper};
use medwarehouse::server::run_server;
use medwarehouse::transform::{RunMode, Transformer};
use medwarehouse::{db, telemetry};

#[derive(Parser)]
#[command(name = "medwarehouse", version, about = "Telegram medical data warehouse")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the analytics API server
    Serve,
    /// Apply pending database migrations
    Migrate,
    /// Scrape configured channels into the landing store
    Scrape {
        /// Scrape full channel history instead of only new messages
        #[arg(long)]
        full: bool,
    },
    /// Load landing files into the raw tables
    LoadRaw {
        /// Truncate and reload instead of upserting (bootstrap only)
        #[arg(long)]
        full_refresh: bool,
    },
    /// Run the SQL transformation stages and data-quality checks
    Transform {
        /// Rebuild the fact tables from the full history
        #[arg(long)]
        full: bool,
    },
    /// Run object detection over landed images and load the results
    Enrich {
        /// Rebuild the detection fact from the full history
        #[arg(long)]
        full: bool,
    },
    /// Run the full pipeline: scrape, load, transform, enrich, verify
    Pipeline {
        /// Run every stage over the full history
        #[arg(long)]
        full: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config);
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "configuration loaded");
    }

    let store = LandingStore::new(
        config.scraper.landing_dir.clone(),
        config.scraper.image_dir.clone(),
    );

    match cli.command {
        Command::Serve => {
            let db = db::init_pool(&config).await?;
            db::health_check(&db).await?;
            run_server(config, db).await.map_err(|e| anyhow!("{e}"))?;
        }
        Command::Migrate => {
            let db = db::init_pool(&config).await?;
            Migrator::up(&db, None).await?;
            tracing::info!("migrations applied");
        }
        Command::Scrape { full } => {
            let client = GatewayClient::new(&config.scraper.gateway_base_url)?;
            let mode = if full {
                ScrapeMode::Full
            } else {
                ScrapeMode::Incremental
            };
            let report = Scraper::new(&client, &store, &config.scraper).run(mode).await;
            if report.messages_per_channel.is_empty() && !report.failed_channels.is_empty() {
                bail!(
                    "all channels failed: {}",
                    report.failed_channels.join(", ")
                );
            }
            tracing::info!(
                messages = report.total_messages(),
                failed_channels = report.failed_channels.len(),
                "scrape complete"
            );
        }
        Command::LoadRaw { full_refresh } => {
            let db = db::init_pool(&config).await?;
            let mode = if full_refresh {
                LoadMode::FullRefresh
            } else {
                LoadMode::Upsert
            };
            loader::load_messages(&db, &store, mode).await?;
        }
        Command::Transform { full } => {
            let db = db::init_pool(&config).await?;
            let mode = if full {
                RunMode::Full
            } else {
                RunMode::Incremental
            };
            Transformer::new(&db, &config).run(mode).await?;
        }
        Command::Enrich { full } => {
            let db = db::init_pool(&config).await?;
            let detector = SidecarDetector::new(&config.detector.endpoint, &config.detector.model);
            Enricher::new(&detector, &store, &config.detector)
                .run()
                .await?;
            loader::load_detections(&db, &config.detector.detections_path).await?;
            let mode = if full {
                RunMode::Full
            } else {
                RunMode::Incremental
            };
            Transformer::new(&db, &config)
                .build_fct_image_detections(mode)
                .await?;
        }
        Command::Pipeline { full } => {
            let db = db::init_pool(&config).await?;
            let client = GatewayClient::new(&config.scraper.gateway_base_url)?;
            let detector = SidecarDetector::new(&config.detector.endpoint, &config.detector.model);
            let (scrape_mode, transform_mode) = if full {
                (ScrapeMode::Full, RunMode::Full)
            } else {
                (ScrapeMode::Incremental, RunMode::Incremental)
            };
            let report = Pipeline::new(&config, &db, &client, &detector)
                .run(scrape_mode, LoadMode::Upsert, transform_mode)
                .await;
            println!("{}", report.summary());
            if !report.succeeded() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
