// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Sensor manager - polls all MQ sensors through one analog source

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use anyhow::{anyhow, Result};
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{info, warn, error, debug};

use super::{estimate, calibrate, AnalogSource, RawSampleBatch, SensorCalibration};
use super::{CurveTable, SensorHealth, SensorReading, SensorStatus};
use crate::config::{BoardConfig, Config, MqSensorConfig, SamplingConfig};
use crate::error::GasResult;

/// Owns the analog source, the calibrations and per-sensor health
pub struct SensorManager<S: AnalogSource> {
    source: S,
    board: BoardConfig,
    sampling: SamplingConfig,
    sensors: BTreeMap<String, MqSensorConfig>,
    curves: CurveTable,
    calibrations: BTreeMap<String, SensorCalibration>,
    /// Sensor id for climate readings, when enabled
    environment: Option<String>,
    health: RwLock<HashMap<String, SensorHealth>>,
}

impl<S: AnalogSource> SensorManager<S> {
    /// Sensors with an `r0` in the config start out calibrated
    pub fn new(config: &Config, curves: CurveTable, source: S) -> GasResult<Self> {
        let mut calibrations = BTreeMap::new();
        let mut health = HashMap::new();

        for (id, sensor) in &config.sensors {
            let status = match sensor.r0 {
                Some(r0) => {
                    calibrations.insert(id.clone(), SensorCalibration::new(id, sensor.clean_air_ratio, r0)?);
                    SensorStatus::Active
                }
                None => SensorStatus::Uncalibrated,
            };
            health.insert(id.clone(), SensorHealth::new(id, status));
        }

        let environment = config.environment.enabled.then(|| config.environment.id.clone());
        if let Some(id) = &environment {
            health.insert(id.clone(), SensorHealth::new(id, SensorStatus::Active));
        }

        info!("Sensor manager using {} for {} sensors", source.name(), config.sensors.len());

        Ok(Self {
            source,
            board: config.board,
            sampling: config.sampling.clone(),
            sensors: config.sensors.clone(),
            curves,
            calibrations,
            environment,
            health: RwLock::new(health),
        })
    }

    /// Adopt stored calibrations for sensors that have none yet.
    /// Returns how many were taken.
    pub fn adopt_calibrations(&mut self, stored: Vec<SensorCalibration>) -> usize {
        let mut adopted = 0;
        for calibration in stored {
            let id = calibration.sensor_id.clone();
            if !self.sensors.contains_key(&id) || self.calibrations.contains_key(&id) {
                continue;
            }
            debug!("Using stored R0 {:.5} for {}", calibration.baseline_resistance, id);
            self.set_status(&id, SensorStatus::Active);
            self.calibrations.insert(id, calibration);
            adopted += 1;
        }
        adopted
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn calibration(&self, sensor_id: &str) -> Option<&SensorCalibration> {
        self.calibrations.get(sensor_id)
    }

    pub fn calibrations(&self) -> impl Iterator<Item = &SensorCalibration> {
        self.calibrations.values()
    }

    pub fn is_fully_calibrated(&self) -> bool {
        self.sensors.keys().all(|id| self.calibrations.contains_key(id))
    }

    pub fn get_health(&self, id: &str) -> Option<SensorHealth> {
        self.health.read().get(id).cloned()
    }

    pub fn get_all_health(&self) -> Vec<SensorHealth> {
        let mut all: Vec<_> = self.health.read().values().cloned().collect();
        all.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));
        all
    }

    /// Take `rounds` reads of every sensor. Each round reads all pins once,
    /// then sleeps for `interval`. A sensor whose read fails is dropped from
    /// the rest of the collection.
    pub async fn collect_batches(
        &mut self,
        rounds: usize,
        interval: Duration,
    ) -> BTreeMap<String, Result<RawSampleBatch>> {
        let mut samples: BTreeMap<String, Vec<u16>> = self
            .sensors
            .keys()
            .map(|id| (id.clone(), Vec::with_capacity(rounds)))
            .collect();
        let mut failed: BTreeMap<String, anyhow::Error> = BTreeMap::new();

        for _ in 0..rounds {
            for (id, sensor) in &self.sensors {
                if failed.contains_key(id) {
                    continue;
                }
                match self.source.read_raw(sensor.pin).await {
                    Ok(raw) => {
                        if let Some(batch) = samples.get_mut(id) {
                            batch.push(raw);
                        }
                    }
                    Err(e) => {
                        debug!("Read error for {} on pin {}: {}", id, sensor.pin, e);
                        failed.insert(id.clone(), e);
                    }
                }
            }
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }

        let max = self.board.analog_read_max;
        samples
            .into_iter()
            .map(|(id, batch)| {
                let result = match failed.remove(&id) {
                    Some(e) => Err(e.context(format!("{}: analog read failed", id))),
                    None => RawSampleBatch::new(batch, max).map_err(|e| anyhow!("{}: {}", id, e)),
                };
                (id, result)
            })
            .collect()
    }

    /// Measure R0 for every sensor. The air must be clean while this runs.
    pub async fn calibrate_all(&mut self) -> Vec<SensorCalibration> {
        let ids: Vec<String> = self.sensors.keys().cloned().collect();
        for id in &ids {
            self.set_status(id, SensorStatus::Calibrating);
        }

        info!(
            "Calibrating {} sensors over {} samples...",
            ids.len(),
            self.sampling.calibration_samples
        );
        let batches = self
            .collect_batches(self.sampling.calibration_samples, self.sampling.calibration_interval())
            .await;

        let mut results = Vec::new();
        for (id, batch) in batches {
            let Some(sensor) = self.sensors.get(&id) else { continue };
            let outcome = batch.and_then(|b| {
                calibrate(&id, &b, sensor.clean_air_ratio, &self.board).map_err(anyhow::Error::from)
            });

            match outcome {
                Ok(calibration) => {
                    info!("Calibrated {}: R0 = {:.5}", id, calibration.baseline_resistance);
                    self.set_status(&id, SensorStatus::Active);
                    self.calibrations.insert(id.clone(), calibration.clone());
                    results.push(calibration);
                }
                Err(e) => {
                    error!("Calibration failed for {}: {}", id, e);
                    self.record_error(&id, &e.to_string());
                    // A previous R0 stays usable
                    let status = if self.calibrations.contains_key(&id) {
                        SensorStatus::Active
                    } else {
                        SensorStatus::Error
                    };
                    self.set_status(&id, status);
                }
            }
        }
        results
    }

    /// Read and convert every calibrated sensor once, then the climate sensor.
    ///
    /// Failed gases are logged and left out; a reading with no gas left is dropped.
    pub async fn poll_once(&mut self) -> Vec<SensorReading> {
        let batches = self
            .collect_batches(self.sampling.runtime_samples, self.sampling.runtime_interval())
            .await;
        let now = Utc::now();

        let mut readings = Vec::new();
        for (id, batch) in batches {
            let Some(calibration) = self.calibrations.get(&id) else {
                debug!("Skipping uncalibrated sensor {}", id);
                continue;
            };

            let batch = match batch {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("{}", e);
                    self.record_error(&id, &e.to_string());
                    continue;
                }
            };

            match estimate(batch.mean(), calibration, &self.curves, &self.board, now) {
                Ok(result) => {
                    for (gas, e) in &result.failures {
                        warn!("{}_{}: {}", id, gas, e);
                    }
                    {
                        let mut health = self.health.write();
                        if let Some(h) = health.get_mut(&id) {
                            h.readings_count += 1;
                            h.last_ratio = Some(result.ratio);
                            h.status = SensorStatus::Active;
                        }
                    }
                    if result.reading.is_empty() {
                        continue;
                    }
                    readings.push(result.reading);
                }
                Err(e) => {
                    warn!("Conversion failed for {}: {}", id, e);
                    self.record_error(&id, &e.to_string());
                }
            }
        }

        if let Some(reading) = self.poll_environment(now).await {
            readings.push(reading);
        }
        readings
    }

    async fn poll_environment(&mut self, now: chrono::DateTime<Utc>) -> Option<SensorReading> {
        let id = self.environment.clone()?;
        match self.source.read_environment().await {
            Ok(Some(sample)) => {
                let values = sample.values();
                if values.is_empty() {
                    self.record_error(&id, "climate sensor returned no finite values");
                    return None;
                }
                if let Some(h) = self.health.write().get_mut(&id) {
                    h.readings_count += 1;
                    h.status = SensorStatus::Active;
                }
                Some(SensorReading::new(&id, now, values))
            }
            Ok(None) => {
                debug!("{} has no climate sensor", self.source.name());
                None
            }
            Err(e) => {
                warn!("{}: climate read failed: {}", id, e);
                self.record_error(&id, &e.to_string());
                self.set_status(&id, SensorStatus::Error);
                None
            }
        }
    }

    fn set_status(&self, id: &str, status: SensorStatus) {
        if let Some(h) = self.health.write().get_mut(id) {
            h.status = status;
        }
    }

    fn record_error(&self, id: &str, message: &str) {
        if let Some(h) = self.health.write().get_mut(id) {
            h.error_count += 1;
            h.last_error = Some(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::sensors::{AnalogSimulator, EnvironmentSample};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.sampling.calibration_interval_ms = 0;
        config.sampling.runtime_interval_ms = 0;
        config.sampling.calibration_samples = 10;
        config
    }

    fn quiet_simulator() -> AnalogSimulator {
        AnalogSimulator::seeded(1023, 11)
            .with_noise(0.0)
            .with_event_probability(0.0)
            .with_baseline(0, 120)
            .with_baseline(1, 140)
            .with_baseline(2, 160)
    }

    fn manager(config: &Config, source: AnalogSimulator) -> SensorManager<AnalogSimulator> {
        let curves = config.validate().unwrap();
        SensorManager::new(config, curves, source).unwrap()
    }

    /// Fails every read on one pin
    struct BrokenPin {
        inner: AnalogSimulator,
        broken: u8,
    }

    #[async_trait]
    impl AnalogSource for BrokenPin {
        async fn read_raw(&mut self, pin: u8) -> Result<u16> {
            if pin == self.broken {
                anyhow::bail!("i2c timeout")
            }
            self.inner.read_raw(pin).await
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_uncalibrated_sensors_are_skipped() {
        let config = test_config();
        let mut mgr = manager(&config, quiet_simulator());

        assert!(!mgr.is_fully_calibrated());
        assert!(mgr.poll_once().await.is_empty());
        assert_eq!(mgr.get_health("mq2").unwrap().status, SensorStatus::Uncalibrated);
    }

    #[tokio::test]
    async fn test_calibrate_then_poll_in_clean_air() {
        let config = test_config();
        let mut mgr = manager(&config, quiet_simulator());

        let calibrations = mgr.calibrate_all().await;
        assert_eq!(calibrations.len(), 3);
        assert!(mgr.is_fully_calibrated());

        let readings = mgr.poll_once().await;
        assert_eq!(readings.len(), 3);

        // Same air as during calibration: ratio equals the clean-air ratio
        let mq2 = mgr.get_health("mq2").unwrap();
        assert!((mq2.last_ratio.unwrap() - 9.48).abs() < 1e-9);
        assert_eq!(mq2.readings_count, 1);

        let mq2_reading = readings.iter().find(|r| r.sensor_id == "mq2").unwrap();
        assert_eq!(mq2_reading.len(), 7);
    }

    #[tokio::test]
    async fn test_plume_raises_concentration() {
        let config = test_config();
        let mut mgr = manager(&config, quiet_simulator());
        mgr.calibrate_all().await;

        let before = mgr.poll_once().await;
        mgr.source_mut().inject_plume(0, 400.0);
        let after = mgr.poll_once().await;

        let lpg = |readings: &[SensorReading]| {
            readings
                .iter()
                .find(|r| r.sensor_id == "mq2")
                .and_then(|r| r.values.get("lpg").copied())
                .unwrap()
        };
        assert!(lpg(&after) > lpg(&before) * 10.0);
    }

    #[tokio::test]
    async fn test_read_failure_is_isolated() {
        let config = test_config();
        let curves = config.validate().unwrap();
        let source = BrokenPin { inner: quiet_simulator(), broken: 1 };
        let mut mgr = SensorManager::new(&config, curves, source).unwrap();

        let calibrations = mgr.calibrate_all().await;
        assert_eq!(calibrations.len(), 2);
        assert!(mgr.calibration("mq9").is_none());

        let health = mgr.get_health("mq9").unwrap();
        assert_eq!(health.status, SensorStatus::Error);
        assert_eq!(health.error_count, 1);
        assert!(health.last_error.unwrap().contains("mq9"));

        let readings = mgr.poll_once().await;
        assert_eq!(readings.len(), 2);
    }

    #[tokio::test]
    async fn test_config_r0_and_stored_calibrations() {
        let mut config = test_config();
        if let Some(mq2) = config.sensors.get_mut("mq2") {
            mq2.r0 = Some(0.5);
        }
        let mut mgr = manager(&config, quiet_simulator());
        assert_eq!(mgr.calibration("mq2").unwrap().baseline_resistance, 0.5);

        let stored = vec![
            SensorCalibration::new("mq2", 9.48, 0.9).unwrap(),
            SensorCalibration::new("mq9", 9.74, 0.7).unwrap(),
            SensorCalibration::new("mq7", 27.0, 0.7).unwrap(),
        ];
        assert_eq!(mgr.adopt_calibrations(stored), 1);
        assert_eq!(mgr.calibration("mq2").unwrap().baseline_resistance, 0.5);
        assert_eq!(mgr.calibration("mq9").unwrap().baseline_resistance, 0.7);
        assert_eq!(mgr.get_health("mq9").unwrap().status, SensorStatus::Active);
        assert!(mgr.calibration("mq5").is_none());
    }

    #[tokio::test]
    async fn test_saturated_sensor_fails_calibration() {
        let config = test_config();
        let source = quiet_simulator().with_baseline(2, 1023);
        let mut mgr = manager(&config, source);

        let calibrations = mgr.calibrate_all().await;
        assert_eq!(calibrations.len(), 2);
        assert_eq!(mgr.get_health("mq5").unwrap().status, SensorStatus::Error);
    }

    #[tokio::test]
    async fn test_poll_includes_environment_reading() {
        let config = test_config();
        let source = quiet_simulator().with_environment(EnvironmentSample::new(22.5, 1012.0, 48.0));
        let mut mgr = manager(&config, source);

        // Climate values need no R0
        let readings = mgr.poll_once().await;
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].sensor_id, "bme680");
        assert_eq!(readings[0].values["temperature"], 22.5);
        assert_eq!(readings[0].values["pressure"], 1012.0);
        assert_eq!(readings[0].values["humidity"], 48.0);

        mgr.calibrate_all().await;
        assert_eq!(mgr.poll_once().await.len(), 4);
        assert_eq!(mgr.get_health("bme680").unwrap().readings_count, 2);
    }

    #[tokio::test]
    async fn test_environment_disabled_is_not_read() {
        let mut config = test_config();
        config.environment.enabled = false;
        config.alerts.rules.retain(|r| r.sensor != "bme680");
        let source = quiet_simulator().with_environment(EnvironmentSample::new(22.5, 1012.0, 48.0));
        let mut mgr = manager(&config, source);

        mgr.calibrate_all().await;
        let readings = mgr.poll_once().await;
        assert_eq!(readings.len(), 3);
        assert!(mgr.get_health("bme680").is_none());
    }

    #[tokio::test]
    async fn test_environment_read_failure_is_recorded() {
        struct NoClimate(AnalogSimulator);

        #[async_trait]
        impl AnalogSource for NoClimate {
            async fn read_raw(&mut self, pin: u8) -> Result<u16> {
                self.0.read_raw(pin).await
            }

            async fn read_environment(&mut self) -> Result<Option<EnvironmentSample>> {
                anyhow::bail!("bme680 not responding")
            }

            fn name(&self) -> &str {
                "no-climate"
            }
        }

        let config = test_config();
        let curves = config.validate().unwrap();
        let mut mgr = SensorManager::new(&config, curves, NoClimate(quiet_simulator())).unwrap();
        mgr.calibrate_all().await;

        assert_eq!(mgr.poll_once().await.len(), 3);
        let health = mgr.get_health("bme680").unwrap();
        assert_eq!(health.status, SensorStatus::Error);
        assert_eq!(health.error_count, 1);
    }
}
