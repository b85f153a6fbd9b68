//! CLI interface for Skywatch

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Scheduled and on-demand weather ingestion
#[derive(Parser)]
#[command(name = "skywatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler until interrupted
    Run {
        /// Configuration file path
        #[arg(short, long, default_value = "skywatch.yaml")]
        config: PathBuf,
    },

    /// Ingest one location now and print the result
    Fetch {
        /// Configuration file path
        #[arg(short, long, default_value = "skywatch.yaml")]
        config: PathBuf,

        /// Source key (default: on_demand.key)
        #[arg(short, long)]
        key: Option<String>,

        /// Latitude (default: on_demand.latitude)
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude (default: on_demand.longitude)
        #[arg(long, allow_negative_numbers = true)]
        lon: Option<f64>,
    },

    /// Print the latest stored measurement
    Latest {
        /// Configuration file path
        #[arg(short, long, default_value = "skywatch.yaml")]
        config: PathBuf,

        /// Source key (default: newest across all keys)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Validate a configuration file
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "skywatch.yaml")]
        config: PathBuf,
    },

    /// Generate an example configuration file
    Init,
}
