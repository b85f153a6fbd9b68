//! Measurement storage
//!
//! Stores hold the most recent [`Measurement`] per source key. Two backends
//! are provided: [`MemoryStore`] for single-process use and tests, and
//! [`SqliteStore`] for durable storage.

mod measurement;
mod memory;
mod sqlite;
mod store;

pub use measurement::Measurement;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{MeasurementStore, PutOutcome, StoreError, WritePolicy};
