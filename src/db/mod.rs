// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Database module for persistent storage

use std::collections::BTreeMap;
use std::sync::Arc;
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{info, debug};

use crate::config::DatabaseConfig;
use crate::sensors::{SensorCalibration, SensorReading};

const INSERT_READING: &str = "INSERT INTO readings (timestamp, sensor_id, metrics) VALUES (?1, ?2, ?3)";

/// Time-ordered reading log
pub trait ReadingStore: Send + Sync {
    fn append(&self, reading: &SensorReading) -> Result<()>;

    /// Append one poll's readings. Returns how many were stored.
    fn append_batch(&self, readings: &[SensorReading]) -> Result<usize> {
        for reading in readings {
            self.append(reading)?;
        }
        Ok(readings.len())
    }

    /// Readings at or after `since`, oldest first
    fn readings_since(&self, since: DateTime<Utc>) -> Result<Vec<SensorReading>>;

    /// Drop readings older than `cutoff`. Returns how many were removed.
    fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Fixed-width UTC text so that string order is time order
fn timestamp_key(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite-backed store
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.path)?;

        conn.execute_batch(r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#)?;

        let db = Self::with_connection(conn)?;
        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                sensor_id TEXT NOT NULL,
                metrics TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON readings(timestamp);

            CREATE TABLE IF NOT EXISTS calibrations (
                sensor_id TEXT PRIMARY KEY,
                clean_air_ratio REAL NOT NULL,
                baseline_resistance REAL NOT NULL,
                calibrated_at TEXT NOT NULL
            );
        "#)?;

        Ok(())
    }

    /// Replace the stored R0 of a sensor
    pub fn store_calibration(&self, calibration: &SensorCalibration) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR REPLACE INTO calibrations (sensor_id, clean_air_ratio, baseline_resistance, calibrated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                calibration.sensor_id,
                calibration.clean_air_ratio,
                calibration.baseline_resistance,
                calibration.calibrated_at.to_rfc3339()
            ],
        )?;

        Ok(())
    }

    pub fn load_calibrations(&self) -> Result<Vec<SensorCalibration>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT sensor_id, clean_air_ratio, baseline_resistance, calibrated_at
             FROM calibrations ORDER BY sensor_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (sensor_id, ratio, r0, calibrated_at) = row?;
            let calibrated_at = DateTime::parse_from_rfc3339(&calibrated_at)?.with_timezone(&Utc);
            results.push(SensorCalibration::new(&sensor_id, ratio, r0)?.with_timestamp(calibrated_at));
        }
        Ok(results)
    }

    pub fn reading_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl ReadingStore for Database {
    fn append(&self, reading: &SensorReading) -> Result<()> {
        self.append_batch(std::slice::from_ref(reading)).map(|_| ())
    }

    /// One transaction per batch
    fn append_batch(&self, readings: &[SensorReading]) -> Result<usize> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        for reading in readings {
            tx.execute(
                INSERT_READING,
                params![
                    timestamp_key(&reading.timestamp),
                    reading.sensor_id,
                    serde_json::to_string(&reading.values)?
                ],
            )?;
            debug!("Stored reading for {} ({} metrics)", reading.sensor_id, reading.len());
        }

        tx.commit()?;
        Ok(readings.len())
    }

    fn readings_since(&self, since: DateTime<Utc>) -> Result<Vec<SensorReading>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT timestamp, sensor_id, metrics FROM readings
             WHERE timestamp >= ?1 ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![timestamp_key(&since)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (timestamp, sensor_id, metrics) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)?.with_timezone(&Utc);
            let values: BTreeMap<String, f64> = serde_json::from_str(&metrics)?;
            results.push(SensorReading::new(&sensor_id, timestamp, values));
        }
        Ok(results)
    }

    fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM readings WHERE timestamp < ?1",
            params![timestamp_key(&cutoff)],
        )?;
        if deleted > 0 {
            info!("Cleaned up {} readings older than {}", deleted, cutoff);
        }
        Ok(deleted)
    }
}

/// In-memory store for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    readings: Mutex<Vec<SensorReading>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.readings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.lock().is_empty()
    }
}

impl ReadingStore for MemoryStore {
    fn append(&self, reading: &SensorReading) -> Result<()> {
        let mut readings = self.readings.lock();
        // Keep time order even if a reading arrives late
        let pos = readings.partition_point(|r| r.timestamp <= reading.timestamp);
        readings.insert(pos, reading.clone());
        Ok(())
    }

    fn readings_since(&self, since: DateTime<Utc>) -> Result<Vec<SensorReading>> {
        let readings = self.readings.lock();
        Ok(readings.iter().filter(|r| r.timestamp >= since).cloned().collect())
    }

    fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut readings = self.readings.lock();
        let before = readings.len();
        readings.retain(|r| r.timestamp >= cutoff);
        Ok(before - readings.len())
    }
}
