//! SQLite-backed store
//!
//! A single connection behind a mutex acts as the only writer. Each `put`
//! reads the current row and upserts inside one transaction, so the write
//! policy check and the write are atomic.

use super::{Measurement, MeasurementStore, PutOutcome, StoreError, WritePolicy};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS measurements (
    source_key TEXT PRIMARY KEY CHECK (length(trim(source_key)) > 0),
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    temperature REAL NOT NULL,
    wind_speed REAL NOT NULL,
    observed_at TEXT NOT NULL,
    ingested_at TEXT NOT NULL
) WITHOUT ROWID";

const SELECT_COLUMNS: &str = "SELECT source_key, latitude, longitude, temperature, wind_speed, \
     observed_at, ingested_at FROM measurements";

/// Durable latest-per-key store
#[derive(Debug)]
pub struct SqliteStore {
    policy: WritePolicy,
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: &Path, policy: WritePolicy) -> Result<Self, StoreError> {
        let connection = Connection::open(path).map_err(|source| StoreError::Sqlite {
            operation: "open database",
            source,
        })?;
        Self::from_connection(connection, policy)
    }

    /// Open a private in-memory database
    pub fn open_in_memory(policy: WritePolicy) -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(|source| StoreError::Sqlite {
            operation: "open in-memory database",
            source,
        })?;
        Self::from_connection(connection, policy)
    }

    fn from_connection(connection: Connection, policy: WritePolicy) -> Result<Self, StoreError> {
        connection
            .execute(SCHEMA, [])
            .map_err(|source| StoreError::Sqlite {
                operation: "create measurements table",
                source,
            })?;
        Ok(Self {
            policy,
            connection: Mutex::new(connection),
        })
    }

    /// Get the write policy
    pub fn policy(&self) -> WritePolicy {
        self.policy
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(key: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRecord {
            key: key.to_string(),
            message: format!("bad timestamp '{value}': {e}"),
        })
}

/// Raw row, timestamps still as text
struct StoredRow {
    source_key: String,
    latitude: f64,
    longitude: f64,
    temperature: f64,
    wind_speed: f64,
    observed_at: String,
    ingested_at: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            source_key: row.get(0)?,
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            temperature: row.get(3)?,
            wind_speed: row.get(4)?,
            observed_at: row.get(5)?,
            ingested_at: row.get(6)?,
        })
    }

    fn into_measurement(self) -> Result<Measurement, StoreError> {
        let observed_at = parse_timestamp(&self.source_key, &self.observed_at)?;
        let ingested_at = parse_timestamp(&self.source_key, &self.ingested_at)?;
        Ok(Measurement {
            source_key: self.source_key,
            latitude: self.latitude,
            longitude: self.longitude,
            temperature: self.temperature,
            wind_speed: self.wind_speed,
            observed_at,
            ingested_at,
        })
    }
}

fn select_one(
    connection: &Connection,
    source_key: &str,
) -> Result<Option<Measurement>, StoreError> {
    let row = connection
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE source_key = ?1"),
            [source_key],
            StoredRow::from_row,
        )
        .optional()
        .map_err(|source| StoreError::Sqlite {
            operation: "select measurement",
            source,
        })?;
    row.map(StoredRow::into_measurement).transpose()
}

impl MeasurementStore for SqliteStore {
    fn put(&self, mut measurement: Measurement) -> Result<PutOutcome, StoreError> {
        let mut connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        let transaction = connection
            .transaction()
            .map_err(|source| StoreError::Sqlite {
                operation: "begin write transaction",
                source,
            })?;

        if let Some(existing) = select_one(&transaction, &measurement.source_key)? {
            if !self.policy.accepts(&existing, &measurement) {
                return Ok(PutOutcome::Superseded {
                    existing_observed_at: existing.observed_at,
                });
            }
        }

        measurement.ingested_at = Utc::now();
        transaction
            .execute(
                "INSERT INTO measurements (
                    source_key, latitude, longitude, temperature, wind_speed,
                    observed_at, ingested_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(source_key) DO UPDATE SET
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    temperature = excluded.temperature,
                    wind_speed = excluded.wind_speed,
                    observed_at = excluded.observed_at,
                    ingested_at = excluded.ingested_at",
                (
                    measurement.source_key.as_str(),
                    measurement.latitude,
                    measurement.longitude,
                    measurement.temperature,
                    measurement.wind_speed,
                    format_timestamp(&measurement.observed_at),
                    format_timestamp(&measurement.ingested_at),
                ),
            )
            .map_err(|source| StoreError::Sqlite {
                operation: "upsert measurement",
                source,
            })?;

        transaction.commit().map_err(|source| StoreError::Sqlite {
            operation: "commit write transaction",
            source,
        })?;

        // Round-trip through the stored text so callers see what readers will
        measurement.observed_at = parse_timestamp(
            &measurement.source_key,
            &format_timestamp(&measurement.observed_at),
        )?;
        measurement.ingested_at = parse_timestamp(
            &measurement.source_key,
            &format_timestamp(&measurement.ingested_at),
        )?;
        Ok(PutOutcome::Stored(measurement))
    }

    fn get_latest(&self, source_key: &str) -> Result<Option<Measurement>, StoreError> {
        let connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        select_one(&connection, source_key)
    }

    fn snapshot(&self) -> Result<Vec<Measurement>, StoreError> {
        let connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        let mut statement = connection
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY observed_at DESC"))
            .map_err(|source| StoreError::Sqlite {
                operation: "prepare snapshot",
                source,
            })?;
        let rows = statement
            .query_map([], StoredRow::from_row)
            .map_err(|source| StoreError::Sqlite {
                operation: "query snapshot",
                source,
            })?;

        let mut all = Vec::new();
        for row in rows {
            let row = row.map_err(|source| StoreError::Sqlite {
                operation: "read snapshot row",
                source,
            })?;
            all.push(row.into_measurement()?);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn observed(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, day, 12, 0, 0).unwrap()
    }

    fn measurement(key: &str, temperature: f64, day: u32) -> Measurement {
        Measurement {
            source_key: key.to_string(),
            latitude: 40.85,
            longitude: 14.27,
            temperature,
            wind_speed: 10.5,
            observed_at: observed(day),
            ingested_at: observed(1),
        }
    }

    #[test]
    fn test_missing_key_is_none() {
        let store = SqliteStore::open_in_memory(WritePolicy::Overwrite).unwrap();
        assert!(store.get_latest("Naples").unwrap().is_none());
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_put_then_get_field_for_field() {
        let store = SqliteStore::open_in_memory(WritePolicy::Overwrite).unwrap();
        let stored = store
            .put(measurement("Naples", 18.0, 3))
            .unwrap()
            .stored()
            .cloned()
            .unwrap();

        let loaded = store.get_latest("Naples").unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert_eq!(loaded.latitude, 40.85);
        assert_eq!(loaded.temperature, 18.0);
        assert_eq!(loaded.observed_at, observed(3));
    }

    #[test]
    fn test_overwrite_and_newer_observation() {
        let store = SqliteStore::open_in_memory(WritePolicy::Overwrite).unwrap();
        store.put(measurement("Naples", 18.0, 3)).unwrap();
        store.put(measurement("Naples", 11.0, 2)).unwrap();
        assert_eq!(store.get_latest("Naples").unwrap().unwrap().temperature, 11.0);

        let strict = SqliteStore::open_in_memory(WritePolicy::NewerObservation).unwrap();
        assert_eq!(strict.policy(), WritePolicy::NewerObservation);
        strict.put(measurement("Naples", 18.0, 3)).unwrap();
        let outcome = strict.put(measurement("Naples", 11.0, 2)).unwrap();
        assert!(outcome.stored().is_none());
        assert_eq!(strict.get_latest("Naples").unwrap().unwrap().temperature, 18.0);
    }

    #[test]
    fn test_snapshot_orders_by_observation() {
        let store = SqliteStore::open_in_memory(WritePolicy::Overwrite).unwrap();
        store.put(measurement("Older", 10.0, 1)).unwrap();
        store.put(measurement("Newest", 20.0, 3)).unwrap();
        store.put(measurement("Middle", 15.0, 2)).unwrap();

        let latest = store.latest_overall().unwrap().unwrap();
        assert_eq!(latest.source_key, "Newest");
        assert_eq!(store.snapshot().unwrap().len(), 3);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("skywatch.db");

        {
            let store = SqliteStore::open(&path, WritePolicy::Overwrite).unwrap();
            store.put(measurement("Bari", 22.5, 3)).unwrap();
        }

        let reopened = SqliteStore::open(&path, WritePolicy::Overwrite).unwrap();
        let m = reopened.get_latest("Bari").unwrap().unwrap();
        assert_eq!(m.temperature, 22.5);
    }
}
