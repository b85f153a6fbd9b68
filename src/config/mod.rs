//! Configuration loading and validation

mod schema;

pub use schema::*;

use crate::store::{MeasurementStore, MemoryStore, SqliteStore};
use anyhow::{Context, Result};
use log::info;
use std::path::Path;
use std::sync::Arc;

/// Load configuration from a YAML file
pub fn load_config(path: &Path) -> Result<SkywatchConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration: {:?}", path))?;
    let config: SkywatchConfig = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse configuration: {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Open the store described by the configuration
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn MeasurementStore>> {
    match config.backend {
        StoreBackend::Memory => {
            let store = MemoryStore::with_policy(config.write_policy);
            info!("using in-memory store ({:?} writes)", store.policy());
            Ok(Arc::new(store))
        }
        StoreBackend::Sqlite => {
            let path = config
                .path
                .as_deref()
                .context("the sqlite store backend requires a path")?;
            let store = SqliteStore::open(path, config.write_policy)
                .with_context(|| format!("failed to open measurement store: {:?}", path))?;
            info!("opened sqlite store at {:?} ({:?} writes)", path, store.policy());
            Ok(Arc::new(store))
        }
    }
}
