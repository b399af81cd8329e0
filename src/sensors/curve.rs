// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Datasheet curves - log-log interpolation of Rs/R0 to ppm

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::error::{GasError, GasResult};

/// One known point `(log10(ppm), log10(Rs/R0))` plus the slope of the line
/// through it, for one gas on one sensor model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CurvePoint", into = "CurvePoint")]
pub struct GasCurve {
    reference_x: f64,
    reference_y: f64,
    slope: f64,
}

/// Config-file shape of a curve, as digitized from the datasheet plot
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CurvePoint {
    pub x: f64,
    pub y: f64,
    pub slope: f64,
}

impl GasCurve {
    pub fn new(reference_x: f64, reference_y: f64, slope: f64) -> GasResult<Self> {
        if slope == 0.0 || !slope.is_finite() {
            return Err(GasError::DivisionByZero(format!("curve slope must be nonzero and finite, got {}", slope)));
        }
        if !reference_x.is_finite() || !reference_y.is_finite() {
            return Err(GasError::DivisionByZero(format!(
                "curve reference point ({}, {}) is not finite",
                reference_x, reference_y
            )));
        }
        Ok(Self { reference_x, reference_y, slope })
    }

    pub fn reference_x(&self) -> f64 { self.reference_x }
    pub fn reference_y(&self) -> f64 { self.reference_y }
    pub fn slope(&self) -> f64 { self.slope }

    /// Estimated concentration in ppm for the resistance ratio `Rs/R0`.
    ///
    /// No clamping is applied; implausible but finite values are returned as-is.
    pub fn ppm(&self, ratio: f64) -> GasResult<f64> {
        if ratio <= 0.0 || !ratio.is_finite() {
            return Err(GasError::InvalidRatio(format!("Rs/R0 ratio must be positive and finite, got {}", ratio)));
        }
        let x = (ratio.log10() - self.reference_y) / self.slope + self.reference_x;
        let ppm = 10f64.powf(x);
        if !ppm.is_finite() {
            return Err(GasError::InvalidRatio(format!("ratio {} extrapolates to a non-finite concentration", ratio)));
        }
        Ok(ppm)
    }

    /// Inverse of [`GasCurve::ppm`]: the ratio the sensor shows at `ppm`
    pub fn ratio_at(&self, ppm: f64) -> f64 {
        10f64.powf((ppm.log10() - self.reference_x) * self.slope + self.reference_y)
    }
}

impl TryFrom<CurvePoint> for GasCurve {
    type Error = GasError;

    fn try_from(p: CurvePoint) -> GasResult<Self> {
        GasCurve::new(p.x, p.y, p.slope)
    }
}

impl From<GasCurve> for CurvePoint {
    fn from(c: GasCurve) -> Self {
        CurvePoint { x: c.reference_x, y: c.reference_y, slope: c.slope }
    }
}

/// Curves keyed by sensor id then gas name
#[derive(Debug, Clone, Default)]
pub struct CurveTable {
    curves: BTreeMap<String, BTreeMap<String, GasCurve>>,
}

impl CurveTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the nested `curves.<sensor>.<gas>` config table, validating every entry
    pub fn from_points(points: &BTreeMap<String, BTreeMap<String, CurvePoint>>) -> GasResult<Self> {
        let mut table = Self::new();
        for (sensor, gases) in points {
            for (gas, point) in gases {
                let curve = GasCurve::try_from(*point).map_err(|e| match e {
                    GasError::DivisionByZero(msg) => GasError::DivisionByZero(format!("{}/{}: {}", sensor, gas, msg)),
                    other => other,
                })?;
                table.insert(sensor, gas, curve);
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, sensor_id: &str, gas: &str, curve: GasCurve) {
        self.curves
            .entry(sensor_id.to_string())
            .or_default()
            .insert(gas.to_string(), curve);
    }

    pub fn get(&self, sensor_id: &str, gas: &str) -> Option<&GasCurve> {
        self.curves.get(sensor_id).and_then(|g| g.get(gas))
    }

    /// All curves registered for a sensor, in gas-name order
    pub fn curves_for(&self, sensor_id: &str) -> impl Iterator<Item = (&str, &GasCurve)> {
        self.curves
            .get(sensor_id)
            .into_iter()
            .flat_map(|g| g.iter().map(|(gas, c)| (gas.as_str(), c)))
    }

    pub fn sensors(&self) -> impl Iterator<Item = &str> {
        self.curves.keys().map(|s| s.as_str())
    }

    pub fn has_sensor(&self, sensor_id: &str) -> bool {
        self.curves.get(sensor_id).map(|g| !g.is_empty()).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.curves.values().map(|g| g.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
