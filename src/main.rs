//! Skywatch - Scheduled and on-demand weather ingestion

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use skywatch::config::{self, StoreBackend};
use skywatch::ingest::{Ingestor, Scheduler, TaskRunner};
use skywatch::provider::OpenMeteoProvider;
use skywatch::store::PutOutcome;
use std::sync::Arc;

mod cli;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config: config_path } => {
            info!("loading configuration from {:?}", config_path);
            let cfg = config::load_config(&config_path)?;

            if cfg.schedule.sources.is_empty() {
                warn!("no sources scheduled; only on-demand ingestion will happen");
            }

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let store = config::open_store(&cfg.store)?;
                let provider = Arc::new(OpenMeteoProvider::new(cfg.open_meteo())?);
                info!("fetching current weather from {}", provider.config().base_url);
                let mut runner = TaskRunner::start(cfg.runner_config(), provider, store);
                let mut scheduler = Scheduler::spawn(cfg.schedule(), runner.handle())?;

                tokio::signal::ctrl_c()
                    .await
                    .context("failed to listen for Ctrl-C")?;
                info!("interrupted, shutting down");

                scheduler.shutdown().await;
                runner.shutdown().await;
                Ok::<_, anyhow::Error>(())
            })?;
        }

        Commands::Fetch {
            config: config_path,
            key,
            lat,
            lon,
        } => {
            let cfg = config::load_config(&config_path)?;
            let key = key.unwrap_or_else(|| cfg.on_demand.key.clone());
            let lat = lat.unwrap_or(cfg.on_demand.latitude);
            let lon = lon.unwrap_or(cfg.on_demand.longitude);

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let store = config::open_store(&cfg.store)?;
                let provider = Arc::new(OpenMeteoProvider::new(cfg.open_meteo())?);
                let mut runner =
                    TaskRunner::start(cfg.runner_config(), provider, Arc::clone(&store));
                let ingestor = Ingestor::new(runner.handle(), store);

                let submission = ingestor.request_ingestion(&key, lat, lon)?;
                println!("{}", serde_json::to_string_pretty(&submission.acknowledgement())?);
                let task = submission.task().clone();

                let report = submission
                    .wait()
                    .await
                    .context("task runner stopped before the ingestion finished")?;
                runner.shutdown().await;

                match &report.outcome {
                    Ok(PutOutcome::Stored(m)) => {
                        println!("{}", serde_json::to_string_pretty(m)?);
                    }
                    Ok(PutOutcome::Superseded { existing_observed_at }) => {
                        println!(
                            "Kept stored measurement for {} observed at {}",
                            task.source_key, existing_observed_at
                        );
                    }
                    Err(e) => bail!(
                        "ingestion for {} at ({}, {}) failed: {}",
                        task.source_key,
                        task.latitude,
                        task.longitude,
                        e
                    ),
                }
                Ok::<_, anyhow::Error>(())
            })?;
        }

        Commands::Latest {
            config: config_path,
            key,
        } => {
            let cfg = config::load_config(&config_path)?;
            if cfg.store.backend == StoreBackend::Memory {
                warn!(
                    "the memory store starts empty; \
                     configure the sqlite backend to read past ingestions"
                );
            }

            let store = config::open_store(&cfg.store)?;
            let latest = match &key {
                Some(key) => store.get_latest(key)?,
                None => store.latest_overall()?,
            };

            match latest {
                Some(m) => println!("{}", serde_json::to_string_pretty(&m)?),
                None => println!("No samples yet"),
            }
        }

        Commands::Check { config: config_path } => {
            println!("Checking configuration at {:?}...", config_path);

            match config::load_config(&config_path) {
                Ok(cfg) => {
                    println!("Configuration is valid!");
                    println!("  Provider: {}", cfg.provider.base_url);
                    println!("  Timeout: {}s", cfg.provider.timeout_secs);
                    println!(
                        "  Runner: {} workers, queue of {}",
                        cfg.runner.workers, cfg.runner.queue_capacity
                    );
                    println!(
                        "  Store: {:?} ({:?})",
                        cfg.store.backend, cfg.store.write_policy
                    );
                    println!("  Interval: {}s", cfg.schedule.interval_secs);
                    println!("  Sources: {}", cfg.schedule.sources.len());
                    for source in &cfg.schedule.sources {
                        println!(
                            "    - {} ({}, {})",
                            source.key, source.latitude, source.longitude
                        );
                    }
                    println!(
                        "  On-demand default: {} ({}, {})",
                        cfg.on_demand.key, cfg.on_demand.latitude, cfg.on_demand.longitude
                    );
                }
                Err(e) => {
                    println!("Configuration is invalid: {:#}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Init => {
            let example_config = include_str!("../skywatch.example.yaml");

            let path = "skywatch.yaml";
            if std::path::Path::new(path).exists() {
                println!("skywatch.yaml already exists. Not overwriting.");
            } else {
                std::fs::write(path, example_config)?;
                println!("Created skywatch.yaml with example configuration.");
            }
        }
    }

    Ok(())
}
