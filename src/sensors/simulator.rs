// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Analog source simulator for demo/testing

use std::collections::HashMap;
use async_trait::async_trait;
use anyhow::Result;
use rand::prelude::*;

use super::{AnalogSource, EnvironmentSample};

/// Per-pin simulation state
struct PinState {
    baseline: f64,
    /// Extra raw counts from an ongoing gas event
    plume: f64,
}

/// Simulates MQ sensor ADC output: a noisy clean-air baseline with occasional
/// gas plumes that rise quickly and decay over subsequent reads.
pub struct AnalogSimulator {
    pins: HashMap<u8, PinState>,
    analog_read_max: u16,
    rng: StdRng,
    noise_level: f64,
    event_probability: f64,
    decay: f64,
    environment: Option<EnvironmentSample>,
}

impl AnalogSimulator {
    pub fn new(analog_read_max: u16) -> Self {
        Self::with_rng(analog_read_max, StdRng::from_entropy())
    }

    /// Deterministic simulator for tests
    pub fn seeded(analog_read_max: u16, seed: u64) -> Self {
        Self::with_rng(analog_read_max, StdRng::seed_from_u64(seed))
    }

    fn with_rng(analog_read_max: u16, rng: StdRng) -> Self {
        Self {
            pins: HashMap::new(),
            analog_read_max,
            rng,
            noise_level: 4.0,
            event_probability: 0.002,
            decay: 0.995,
            environment: None,
        }
    }

    /// Set the clean-air raw level of a pin
    pub fn with_baseline(mut self, pin: u8, baseline: u16) -> Self {
        self.pins.insert(pin, PinState { baseline: baseline as f64, plume: 0.0 });
        self
    }

    pub fn with_noise(mut self, noise_level: f64) -> Self {
        self.noise_level = noise_level.max(0.0);
        self
    }

    pub fn with_event_probability(mut self, probability: f64) -> Self {
        self.event_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Simulate a climate sensor around these values
    pub fn with_environment(mut self, sample: EnvironmentSample) -> Self {
        self.environment = Some(sample);
        self
    }

    /// Inject a gas plume on a pin, in raw counts above baseline
    pub fn inject_plume(&mut self, pin: u8, counts: f64) {
        let default_baseline = self.analog_read_max as f64 * 0.1;
        let state = self.pins.entry(pin).or_insert(PinState { baseline: default_baseline, plume: 0.0 });
        state.plume += counts;
    }
}

#[async_trait]
impl AnalogSource for AnalogSimulator {
    async fn read_raw(&mut self, pin: u8) -> Result<u16> {
        let max = self.analog_read_max as f64;
        let default_baseline = max * 0.1;

        let start_event = self.rng.gen::<f64>() < self.event_probability;
        let event_size = self.rng.gen_range(0.2..0.5) * max;
        let noise = if self.noise_level > 0.0 {
            self.rng.gen_range(-self.noise_level..self.noise_level)
        } else {
            0.0
        };

        let state = self.pins.entry(pin).or_insert(PinState { baseline: default_baseline, plume: 0.0 });
        if start_event {
            state.plume += event_size;
        }
        let value = state.baseline + state.plume + noise;
        state.plume *= self.decay;

        Ok(value.round().clamp(0.0, max) as u16)
    }

    async fn read_environment(&mut self) -> Result<Option<EnvironmentSample>> {
        let Some(base) = self.environment else { return Ok(None) };
        // Climate drifts far less than gas readings
        let spread = self.noise_level / 40.0;
        let mut jitter = || {
            if spread > 0.0 {
                self.rng.gen_range(-spread..spread)
            } else {
                0.0
            }
        };
        Ok(Some(EnvironmentSample::new(
            base.temperature + jitter(),
            base.pressure + jitter() * 10.0,
            (base.humidity + jitter()).clamp(0.0, 100.0),
        )))
    }

    fn name(&self) -> &str {
        "simulator"
    }
}
