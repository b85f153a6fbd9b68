//! In-memory store
//!
//! Each key owns its own slot, so writers to different keys only meet on the
//! outer map lock when a key is inserted for the first time.

use super::{Measurement, MeasurementStore, PutOutcome, StoreError, WritePolicy};
use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

type Slot = Arc<Mutex<Measurement>>;

/// Latest-per-key store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    policy: WritePolicy,
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryStore {
    /// Create an empty store with the default (overwrite) policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given write policy
    pub fn with_policy(policy: WritePolicy) -> Self {
        Self {
            policy,
            slots: RwLock::default(),
        }
    }

    /// Get the write policy
    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// Number of keys with a stored measurement
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check if nothing has been stored yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &str) -> Option<Slot> {
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn replace(&self, slot: &Slot, mut incoming: Measurement) -> PutOutcome {
        let mut current = slot.lock().unwrap_or_else(|e| e.into_inner());
        if !self.policy.accepts(&current, &incoming) {
            return PutOutcome::Superseded {
                existing_observed_at: current.observed_at,
            };
        }
        incoming.ingested_at = Utc::now();
        *current = incoming.clone();
        PutOutcome::Stored(incoming)
    }
}

impl MeasurementStore for MemoryStore {
    fn put(&self, mut measurement: Measurement) -> Result<PutOutcome, StoreError> {
        if let Some(slot) = self.slot(&measurement.source_key) {
            return Ok(self.replace(&slot, measurement));
        }

        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        match slots.entry(measurement.source_key.clone()) {
            Entry::Occupied(entry) => {
                // Another writer inserted the key between our read and write locks
                let slot = Arc::clone(entry.get());
                drop(slots);
                Ok(self.replace(&slot, measurement))
            }
            Entry::Vacant(entry) => {
                measurement.ingested_at = Utc::now();
                entry.insert(Arc::new(Mutex::new(measurement.clone())));
                Ok(PutOutcome::Stored(measurement))
            }
        }
    }

    fn get_latest(&self, source_key: &str) -> Result<Option<Measurement>, StoreError> {
        Ok(self
            .slot(source_key)
            .map(|slot| slot.lock().unwrap_or_else(|e| e.into_inner()).clone()))
    }

    fn snapshot(&self) -> Result<Vec<Measurement>, StoreError> {
        let slots: Vec<Slot> = self
            .slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        let mut all: Vec<Measurement> = slots
            .iter()
            .map(|slot| slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .collect();
        all.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        Ok(all)
    }
}
