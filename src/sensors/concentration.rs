// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Runtime conversion from an averaged raw sample to per-gas ppm

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};

use super::calibration::{prefix, sensor_resistance, SensorCalibration};
use super::curve::CurveTable;
use super::SensorReading;
use crate::config::BoardConfig;
use crate::error::{GasError, GasResult};

/// Result of one conversion: the computable gases plus per-gas failures
#[derive(Debug, Clone)]
pub struct ConcentrationEstimate {
    pub reading: SensorReading,
    pub ratio: f64,
    pub failures: BTreeMap<String, GasError>,
}

impl ConcentrationEstimate {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Convert one averaged raw value into ppm for every gas registered for the sensor.
///
/// A non-positive sensor voltage fails the whole estimate. Curve failures are
/// collected per gas and do not stop the remaining gases.
pub fn estimate(
    avg_raw: f64,
    calibration: &SensorCalibration,
    curves: &CurveTable,
    board: &BoardConfig,
    timestamp: DateTime<Utc>,
) -> GasResult<ConcentrationEstimate> {
    let sensor_id = calibration.sensor_id.as_str();
    if !curves.has_sensor(sensor_id) {
        return Err(GasError::UnknownSensor(format!("no curves registered for {}", sensor_id)));
    }

    let rs = sensor_resistance(avg_raw, board).map_err(|e| prefix(sensor_id, e))?;
    let ratio = rs / calibration.baseline_resistance;

    let mut values = BTreeMap::new();
    let mut failures = BTreeMap::new();
    for (gas, curve) in curves.curves_for(sensor_id) {
        match curve.ppm(ratio) {
            Ok(ppm) => {
                values.insert(gas.to_string(), ppm);
            }
            Err(e) => {
                failures.insert(gas.to_string(), e);
            }
        }
    }

    Ok(ConcentrationEstimate {
        reading: SensorReading::new(sensor_id, timestamp, values),
        ratio,
        failures,
    })
}
