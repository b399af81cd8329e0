// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Clean-air calibration - baseline resistance (R0) per sensor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BoardConfig;
use crate::error::{GasError, GasResult};

/// Raw analog samples from one sensor, all in `[0, analog_read_max]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSampleBatch {
    samples: Vec<u16>,
}

impl RawSampleBatch {
    pub fn new(samples: Vec<u16>, analog_read_max: u16) -> GasResult<Self> {
        if samples.is_empty() {
            return Err(GasError::InvalidReading("sample batch is empty".to_string()));
        }
        if let Some(bad) = samples.iter().find(|&&s| s > analog_read_max) {
            return Err(GasError::InvalidReading(format!(
                "raw sample {} exceeds analog maximum {}",
                bad, analog_read_max
            )));
        }
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Arithmetic mean of the batch
    pub fn mean(&self) -> f64 {
        let sum: u64 = self.samples.iter().map(|&s| s as u64).sum();
        sum as f64 / self.samples.len() as f64
    }
}

/// Baseline resistance of one physical sensor unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorCalibration {
    pub sensor_id: String,
    /// Rs/R0 in clean air for this sensor model
    pub clean_air_ratio: f64,
    /// R0
    pub baseline_resistance: f64,
    pub calibrated_at: DateTime<Utc>,
}

impl SensorCalibration {
    pub fn new(sensor_id: &str, clean_air_ratio: f64, baseline_resistance: f64) -> GasResult<Self> {
        check_clean_air_ratio(sensor_id, clean_air_ratio)?;
        if baseline_resistance <= 0.0 || !baseline_resistance.is_finite() {
            return Err(GasError::InvalidReading(format!(
                "{}: baseline resistance must be positive and finite, got {}",
                sensor_id, baseline_resistance
            )));
        }
        Ok(Self {
            sensor_id: sensor_id.to_string(),
            clean_air_ratio,
            baseline_resistance,
            calibrated_at: Utc::now(),
        })
    }

    pub fn with_timestamp(mut self, calibrated_at: DateTime<Utc>) -> Self {
        self.calibrated_at = calibrated_at;
        self
    }
}

pub(crate) fn check_clean_air_ratio(sensor_id: &str, clean_air_ratio: f64) -> GasResult<()> {
    if clean_air_ratio <= 0.0 || !clean_air_ratio.is_finite() {
        return Err(GasError::DivisionByZero(format!(
            "{}: clean-air ratio must be positive and finite, got {}",
            sensor_id, clean_air_ratio
        )));
    }
    Ok(())
}

/// Sensor output voltage for an averaged raw value
pub fn sensor_voltage(avg_raw: f64, board: &BoardConfig) -> f64 {
    avg_raw / board.analog_read_max as f64 * board.circuit_voltage
}

/// Sensor resistance Rs, in units of the load resistance.
///
/// Fails when the voltage sits at the ground rail (disconnected sensor).
pub fn sensor_resistance(avg_raw: f64, board: &BoardConfig) -> GasResult<f64> {
    let voltage = sensor_voltage(avg_raw, board);
    if voltage <= 0.0 || !voltage.is_finite() {
        return Err(GasError::InvalidReading(format!(
            "sensor voltage {:.4} V is not positive (raw average {:.2})",
            voltage, avg_raw
        )));
    }
    Ok((board.circuit_voltage - voltage) / voltage)
}

/// Derive R0 from a batch collected in clean air
pub fn calibrate(
    sensor_id: &str,
    batch: &RawSampleBatch,
    clean_air_ratio: f64,
    board: &BoardConfig,
) -> GasResult<SensorCalibration> {
    check_clean_air_ratio(sensor_id, clean_air_ratio)?;

    let avg_raw = batch.mean();
    let rs_air = sensor_resistance(avg_raw, board).map_err(|e| prefix(sensor_id, e))?;
    if rs_air <= 0.0 {
        // Raw average at the analog maximum: no voltage drop across the sensor
        return Err(GasError::InvalidReading(format!(
            "{}: raw average {:.2} is at the analog maximum, sensor saturated",
            sensor_id, avg_raw
        )));
    }

    SensorCalibration::new(sensor_id, clean_air_ratio, rs_air / clean_air_ratio)
}

pub(crate) fn prefix(sensor_id: &str, err: GasError) -> GasError {
    match err {
        GasError::InvalidReading(msg) => GasError::InvalidReading(format!("{}: {}", sensor_id, msg)),
        other => other,
    }
}
