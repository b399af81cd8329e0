// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Sensor traits and common types

use std::collections::BTreeMap;
use std::fmt;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use anyhow::Result;

/// A single converted reading: ppm per gas for one sensor at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub timestamp: DateTime<Utc>,
    pub sensor_id: String,
    pub values: BTreeMap<String, f64>,
}

impl SensorReading {
    pub fn new(sensor_id: &str, timestamp: DateTime<Utc>, values: BTreeMap<String, f64>) -> Self {
        Self {
            timestamp,
            sensor_id: sensor_id.to_string(),
            values,
        }
    }

    /// Value of a metric, if this reading carries it
    pub fn metric(&self, key: &MetricKey) -> Option<f64> {
        if self.sensor_id != key.sensor_id {
            return None;
        }
        self.values.get(&key.gas).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Identifies one gas on one sensor, shown as `<sensor>_<gas>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricKey {
    pub sensor_id: String,
    pub gas: String,
}

impl MetricKey {
    pub fn new(sensor_id: &str, gas: &str) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            gas: gas.to_string(),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.sensor_id, self.gas)
    }
}

/// Sensor operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorStatus {
    /// No R0 known yet
    Uncalibrated,
    Calibrating,
    Active,
    Error,
}

/// Metric names carried by an environment reading
pub const ENVIRONMENT_METRICS: [&str; 3] = ["temperature", "pressure", "humidity"];

/// Climate values from a BME680-style sensor next to the MQ array
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSample {
    /// Degrees Celsius
    pub temperature: f64,
    /// hPa
    pub pressure: f64,
    /// Relative humidity in %
    pub humidity: f64,
}

impl EnvironmentSample {
    pub fn new(temperature: f64, pressure: f64, humidity: f64) -> Self {
        Self { temperature, pressure, humidity }
    }

    /// Finite values keyed by metric name
    pub fn values(&self) -> BTreeMap<String, f64> {
        ENVIRONMENT_METRICS
            .iter()
            .zip([self.temperature, self.pressure, self.humidity])
            .filter(|(_, v)| v.is_finite())
            .map(|(name, v)| (name.to_string(), v))
            .collect()
    }
}

/// Raw analog input, e.g. the ADC channels of a GrovePi or an ESP32
#[async_trait]
pub trait AnalogSource: Send {
    /// Read one raw value from an analog pin
    async fn read_raw(&mut self, pin: u8) -> Result<u16>;

    /// Read the climate sensor, if the board has one
    async fn read_environment(&mut self) -> Result<Option<EnvironmentSample>> {
        Ok(None)
    }

    /// Human readable name for logs
    fn name(&self) -> &str;
}

/// Sensor health metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorHealth {
    pub sensor_id: String,
    pub status: SensorStatus,
    pub readings_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_ratio: Option<f64>,
}

impl SensorHealth {
    pub fn new(sensor_id: &str, status: SensorStatus) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            status,
            readings_count: 0,
            error_count: 0,
            last_error: None,
            last_ratio: None,
        }
    }
}
