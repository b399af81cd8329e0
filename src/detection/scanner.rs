// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Windowed threshold scan - first critical sample per rule

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sensors::{MetricKey, SensorReading};

/// Upper bound (and optional lower bound) for one gas on one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub sensor: String,
    pub gas: String,
    pub upper_bound: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<f64>,
}

impl AlertRule {
    pub fn upper(sensor: &str, gas: &str, upper_bound: f64) -> Self {
        Self {
            sensor: sensor.to_string(),
            gas: gas.to_string(),
            upper_bound,
            lower_bound: None,
        }
    }

    pub fn with_lower(mut self, lower_bound: f64) -> Self {
        self.lower_bound = Some(lower_bound);
        self
    }

    pub fn metric(&self) -> MetricKey {
        MetricKey::new(&self.sensor, &self.gas)
    }

    /// Which bound `value` breaks, upper bound first
    pub fn check(&self, value: f64) -> Option<(BoundKind, f64)> {
        if value > self.upper_bound {
            return Some((BoundKind::Above, self.upper_bound));
        }
        match self.lower_bound {
            Some(lower) if value < lower => Some((BoundKind::Below, lower)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundKind {
    Above,
    Below,
}

/// The earliest sample in the window that broke a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalSample {
    pub metric: MetricKey,
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub bound: f64,
    pub kind: BoundKind,
}

/// Outcome of scanning one rule
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// No reading in the window carried the metric
    NoData,
    /// Every sample was within bounds
    Compliant { samples: usize },
    Violated(CriticalSample),
}

impl RuleOutcome {
    pub fn violation(&self) -> Option<&CriticalSample> {
        match self {
            RuleOutcome::Violated(sample) => Some(sample),
            _ => None,
        }
    }
}

/// Scan outcomes in rule order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanReport {
    pub outcomes: Vec<(AlertRule, RuleOutcome)>,
}

impl ScanReport {
    pub fn violations(&self) -> impl Iterator<Item = &CriticalSample> {
        self.outcomes.iter().filter_map(|(_, o)| o.violation())
    }

    pub fn has_violations(&self) -> bool {
        self.violations().next().is_some()
    }

    pub fn violation_count(&self) -> usize {
        self.violations().count()
    }
}

/// Find the first sample breaking `rule`.
///
/// `readings` must already be ordered by timestamp; the scan does not re-sort.
/// Readings from other sensors, or without the rule's gas, are skipped.
pub fn scan_rule(readings: &[SensorReading], rule: &AlertRule) -> RuleOutcome {
    let metric = rule.metric();
    let mut samples = 0;

    for (index, reading) in readings.iter().enumerate() {
        let Some(value) = reading.metric(&metric) else {
            continue;
        };
        samples += 1;

        if let Some((kind, bound)) = rule.check(value) {
            return RuleOutcome::Violated(CriticalSample {
                metric,
                index,
                timestamp: reading.timestamp,
                value,
                bound,
                kind,
            });
        }
    }

    if samples == 0 {
        RuleOutcome::NoData
    } else {
        RuleOutcome::Compliant { samples }
    }
}

/// Scan every rule over the same window
pub fn scan(readings: &[SensorReading], rules: &[AlertRule]) -> ScanReport {
    ScanReport {
        outcomes: rules
            .iter()
            .map(|rule| (rule.clone(), scan_rule(readings, rule)))
            .collect(),
    }
}
