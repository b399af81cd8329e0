// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Monitor loop - periodic storage and alert cycles

use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn, error, debug};

use super::MonitorStats;
use crate::actuator::Actuator;
use crate::config::Config;
use crate::db::ReadingStore;
use crate::detection::{scan, AlertMachine, AlertRule, CycleOutcome};
use crate::notify::Notifier;
use crate::sensors::{AnalogSource, SensorManager};

/// Drives one deployment: sensors, store, alert machine and transports
pub struct Monitor<S: AnalogSource> {
    sensors: SensorManager<S>,
    store: Arc<dyn ReadingStore>,
    rules: Vec<AlertRule>,
    machine: AlertMachine,
    notifier: Box<dyn Notifier>,
    actuator: Box<dyn Actuator>,
    storage_interval: Duration,
    alert_interval: Duration,
    window: chrono::Duration,
    cleanup_interval: Duration,
    retention: chrono::Duration,
    stats: MonitorStats,
}

impl<S: AnalogSource> Monitor<S> {
    pub fn new(
        config: &Config,
        sensors: SensorManager<S>,
        store: Arc<dyn ReadingStore>,
        notifier: Box<dyn Notifier>,
        actuator: Box<dyn Actuator>,
    ) -> Self {
        Self {
            sensors,
            store,
            rules: config.alerts.rules.clone(),
            machine: AlertMachine::new(config.alerts.units.clone()).with_local_time(config.alerts.local_time),
            notifier,
            actuator,
            storage_interval: config.sampling.storage_interval(),
            alert_interval: config.alerts.interval(),
            window: config.alerts.window(),
            cleanup_interval: config.database.cleanup_interval(),
            retention: config.database.retention(),
            stats: MonitorStats::default(),
        }
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn sensors(&self) -> &SensorManager<S> {
        &self.sensors
    }

    pub fn sensors_mut(&mut self) -> &mut SensorManager<S> {
        &mut self.sensors
    }

    /// Poll every sensor once and append the readings. Returns how many were stored.
    pub async fn store_cycle(&mut self) -> usize {
        let readings = self.sensors.poll_once().await;
        if readings.is_empty() {
            return 0;
        }

        match self.store.append_batch(&readings) {
            Ok(stored) => {
                debug!("Stored {} readings", stored);
                self.stats.readings_stored += stored as u64;
                stored
            }
            Err(e) => {
                error!("Failed to store {} readings: {}", readings.len(), e);
                self.stats.store_errors += readings.len() as u64;
                0
            }
        }
    }

    /// Drop readings older than the retention period, measured from `now`
    pub fn cleanup_cycle(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let removed = self.store.delete_before(now - self.retention)?;
        self.stats.readings_purged += removed as u64;
        Ok(removed)
    }

    /// Scan the trailing window ending at `now` and run the alert machine.
    ///
    /// A store read failure skips the cycle and leaves the alert state alone.
    pub async fn run_alert_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let readings = self.store.readings_since(now - self.window)?;
        let report = scan(&readings, &self.rules);

        info!(
            "Alert cycle: {} readings, {} rules, {} critical",
            readings.len(),
            self.rules.len(),
            report.violation_count()
        );
        for violation in report.violations() {
            warn!(
                "{} = {:.2} at {} ({:?} {:.2})",
                violation.metric, violation.value, violation.timestamp, violation.kind, violation.bound
            );
        }

        let outcome = self
            .machine
            .run_cycle(&report, &*self.actuator, &*self.notifier)
            .await;

        self.stats.alert_cycles += 1;
        self.stats.last_cycle = Some(now);
        self.stats.alert_state = outcome.state;
        self.stats.ventilation_on = self.machine.actuator_state().is_on;
        Ok(outcome)
    }

    /// Run until shutdown. The first alert cycle fires one interval after start.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            "Starting monitor: store every {:?}, scan every {:?} over {} min",
            self.storage_interval,
            self.alert_interval,
            self.window.num_minutes()
        );
        self.stats.running = true;

        let mut storage_tick = interval(self.storage_interval);
        storage_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut alert_tick = interval_at(Instant::now() + self.alert_interval, self.alert_interval);
        alert_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick runs the startup sweep
        let mut cleanup_tick = interval(self.cleanup_interval);
        cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Monitor shutting down...");
                    break;
                }
                _ = storage_tick.tick() => {
                    self.store_cycle().await;
                }
                _ = alert_tick.tick() => {
                    if let Err(e) = self.run_alert_cycle(Utc::now()).await {
                        error!("Alert cycle skipped: {}", e);
                    }
                }
                _ = cleanup_tick.tick() => {
                    if let Err(e) = self.cleanup_cycle(Utc::now()) {
                        warn!("Retention cleanup failed: {}", e);
                    }
                }
            }
        }

        self.stats.running = false;
        Ok(())
    }
}
