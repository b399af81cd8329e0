// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Alert and ventilation state machine

use std::collections::BTreeMap;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::scanner::{CriticalSample, ScanReport};
use crate::actuator::{Actuator, SwitchCommand};
use crate::notify::{Notification, Notifier};

pub const ALERT_SUBJECT: &str = "Air Quality Alert";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertState {
    Quiescent,
    Alerting,
}

/// Last actuator position successfully commanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActuatorState {
    pub is_on: bool,
}

/// Everything one cycle will do, computed before any side effect runs
#[derive(Debug, Clone, PartialEq)]
pub struct CycleDecision {
    pub next_state: AlertState,
    pub command: Option<SwitchCommand>,
    pub message: Option<String>,
}

/// What one cycle actually did
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub state: AlertState,
    pub command: Option<SwitchCommand>,
    pub notified: bool,
    pub actuation_failed: bool,
}

/// Owns the alert state and ventilation flag for one deployment
pub struct AlertMachine {
    state: AlertState,
    actuator: ActuatorState,
    units: BTreeMap<String, String>,
    local_time: bool,
}

impl AlertMachine {
    pub fn new(units: BTreeMap<String, String>) -> Self {
        Self {
            state: AlertState::Quiescent,
            actuator: ActuatorState::default(),
            units,
            local_time: false,
        }
    }

    /// Print alert times in the host's local timezone instead of UTC
    pub fn with_local_time(mut self, local_time: bool) -> Self {
        self.local_time = local_time;
        self
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn actuator_state(&self) -> ActuatorState {
        self.actuator
    }

    /// Pure transition: no side effects, no state change
    pub fn decide(&self, report: &ScanReport) -> CycleDecision {
        if report.has_violations() {
            CycleDecision {
                next_state: AlertState::Alerting,
                command: (!self.actuator.is_on).then_some(SwitchCommand::On),
                message: Some(self.format_message(report)),
            }
        } else {
            CycleDecision {
                next_state: AlertState::Quiescent,
                command: self.actuator.is_on.then_some(SwitchCommand::Off),
                message: None,
            }
        }
    }

    /// Run one alert cycle: decide, switch the relay, then notify.
    ///
    /// Transport failures are logged and never abort the cycle. A failed switch
    /// leaves the recorded actuator position unchanged so the next cycle
    /// re-issues it.
    pub async fn run_cycle(
        &mut self,
        report: &ScanReport,
        actuator: &dyn Actuator,
        notifier: &dyn Notifier,
    ) -> CycleOutcome {
        let decision = self.decide(report);

        if decision.next_state != self.state {
            info!("Alert state {:?} -> {:?}", self.state, decision.next_state);
        }

        let mut actuation_failed = false;
        if let Some(command) = decision.command {
            match actuator.switch(command).await {
                Ok(()) => {
                    self.actuator.is_on = command == SwitchCommand::On;
                    info!("Ventilation switched {:?} via {}", command, actuator.name());
                }
                Err(e) => {
                    actuation_failed = true;
                    error!("Failed to switch ventilation {:?}: {}", command, e);
                }
            }
        }

        let mut notified = false;
        if let Some(body) = decision.message {
            let notification = Notification::new(ALERT_SUBJECT, &body, Utc::now());
            info!("Sending alert with {} critical value(s)", report.violation_count());
            match notifier.notify(&notification).await {
                Ok(()) => notified = true,
                Err(e) => warn!("Alert notification dropped: {}", e),
            }
        } else {
            debug!("No critical values in window");
        }

        self.state = decision.next_state;

        CycleOutcome {
            state: self.state,
            command: decision.command,
            notified,
            actuation_failed,
        }
    }

    fn format_message(&self, report: &ScanReport) -> String {
        report
            .violations()
            .map(|v| self.format_line(v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_line(&self, sample: &CriticalSample) -> String {
        let unit = self.units.get(&sample.metric.gas).map(|u| u.as_str()).unwrap_or("ppm");
        let at = if self.local_time {
            sample.timestamp.with_timezone(&Local).format("%H:%M:%S").to_string()
        } else {
            sample.timestamp.format("%H:%M:%S").to_string()
        };
        format!("Critical value for {} of {:.2} {} at {}", sample.metric, sample.value, unit, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;

    use crate::detection::{scan, AlertRule};
    use crate::error::{GasError, GasResult};
    use crate::sensors::SensorReading;

    #[derive(Default)]
    struct RecordingActuator {
        commands: Mutex<Vec<SwitchCommand>>,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl Actuator for RecordingActuator {
        async fn switch(&self, command: SwitchCommand) -> GasResult<()> {
            if *self.fail.lock() {
                return Err(GasError::TransportFailure("relay offline".to_string()));
            }
            self.commands.lock().push(command);
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<Notification>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> GasResult<()> {
            if self.fail {
                return Err(GasError::TransportFailure("smtp down".to_string()));
            }
            self.messages.lock().push(notification.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn report(lpg: Option<f64>) -> ScanReport {
        let t = Utc.with_ymd_and_hms(2019, 1, 23, 14, 3, 22).unwrap();
        let readings: Vec<SensorReading> = lpg
            .into_iter()
            .map(|v| {
                let mut values = BTreeMap::new();
                values.insert("lpg".to_string(), v);
                SensorReading::new("mq2", t, values)
            })
            .collect();
        scan(&readings, &[AlertRule::upper("mq2", "lpg", 2000.0)])
    }

    #[tokio::test]
    async fn test_hysteresis_sequence() {
        let actuator = RecordingActuator::default();
        let notifier = RecordingNotifier::default();
        let mut machine = AlertMachine::new(BTreeMap::new());

        // violation, violation, compliant, violation
        let mut issued = vec![];
        for lpg in [2500.0, 2600.0, 10.0, 3000.0] {
            let outcome = machine.run_cycle(&report(Some(lpg)), &actuator, &notifier).await;
            issued.push(outcome.command);
        }

        assert_eq!(
            issued,
            vec![Some(SwitchCommand::On), None, Some(SwitchCommand::Off), Some(SwitchCommand::On)]
        );
        assert_eq!(actuator.commands.lock().len(), 3);
        assert_eq!(notifier.messages.lock().len(), 3);
        assert_eq!(machine.state(), AlertState::Alerting);
        assert!(machine.actuator_state().is_on);
    }

    #[tokio::test]
    async fn test_quiescent_stays_quiet() {
        let actuator = RecordingActuator::default();
        let notifier = RecordingNotifier::default();
        let mut machine = AlertMachine::new(BTreeMap::new());

        for _ in 0..3 {
            let outcome = machine.run_cycle(&report(None), &actuator, &notifier).await;
            assert_eq!(outcome.state, AlertState::Quiescent);
            assert_eq!(outcome.command, None);
            assert!(!outcome.notified);
        }
        assert!(actuator.commands.lock().is_empty());
        assert!(notifier.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_message_format() {
        let actuator = RecordingActuator::default();
        let notifier = RecordingNotifier::default();
        let mut units = BTreeMap::new();
        units.insert("lpg".to_string(), "ppm".to_string());
        let mut machine = AlertMachine::new(units);

        machine.run_cycle(&report(Some(2100.5)), &actuator, &notifier).await;
        let messages = notifier.messages.lock();
        assert_eq!(messages[0].subject, ALERT_SUBJECT);
        assert_eq!(messages[0].body, "Critical value for mq2_lpg of 2100.50 ppm at 14:03:22");
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_block_actuation() {
        let actuator = RecordingActuator::default();
        let notifier = RecordingNotifier { fail: true, ..Default::default() };
        let mut machine = AlertMachine::new(BTreeMap::new());

        let outcome = machine.run_cycle(&report(Some(5000.0)), &actuator, &notifier).await;
        assert!(!outcome.notified);
        assert_eq!(outcome.state, AlertState::Alerting);
        assert_eq!(*actuator.commands.lock(), vec![SwitchCommand::On]);
        assert!(machine.actuator_state().is_on);
    }

    #[tokio::test]
    async fn test_failed_switch_is_reissued_next_cycle() {
        let actuator = RecordingActuator::default();
        let notifier = RecordingNotifier::default();
        let mut machine = AlertMachine::new(BTreeMap::new());

        *actuator.fail.lock() = true;
        let first = machine.run_cycle(&report(Some(5000.0)), &actuator, &notifier).await;
        assert!(first.actuation_failed);
        assert!(first.notified);
        assert!(!machine.actuator_state().is_on);

        *actuator.fail.lock() = false;
        let second = machine.run_cycle(&report(Some(5000.0)), &actuator, &notifier).await;
        assert_eq!(second.command, Some(SwitchCommand::On));
        assert!(machine.actuator_state().is_on);
    }

    #[tokio::test]
    async fn test_failed_off_keeps_relay_on_until_reissued() {
        let actuator = RecordingActuator::default();
        let notifier = RecordingNotifier::default();
        let mut machine = AlertMachine::new(BTreeMap::new());

        machine.run_cycle(&report(Some(5000.0)), &actuator, &notifier).await;
        assert!(machine.actuator_state().is_on);

        *actuator.fail.lock() = true;
        let failed = machine.run_cycle(&report(Some(10.0)), &actuator, &notifier).await;
        assert_eq!(failed.state, AlertState::Quiescent);
        assert_eq!(failed.command, Some(SwitchCommand::Off));
        assert!(failed.actuation_failed);
        assert!(machine.actuator_state().is_on);

        *actuator.fail.lock() = false;
        let retried = machine.run_cycle(&report(None), &actuator, &notifier).await;
        assert_eq!(retried.command, Some(SwitchCommand::Off));
        assert!(!retried.actuation_failed);
        assert!(!machine.actuator_state().is_on);
        assert_eq!(*actuator.commands.lock(), vec![SwitchCommand::On, SwitchCommand::Off]);
        assert_eq!(notifier.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_message_uses_local_time() {
        let actuator = RecordingActuator::default();
        let notifier = RecordingNotifier::default();
        let mut machine = AlertMachine::new(BTreeMap::new()).with_local_time(true);

        machine.run_cycle(&report(Some(2100.5)), &actuator, &notifier).await;
        let t = Utc.with_ymd_and_hms(2019, 1, 23, 14, 3, 22).unwrap();
        let expected = format!(
            "Critical value for mq2_lpg of 2100.50 ppm at {}",
            t.with_timezone(&Local).format("%H:%M:%S")
        );
        assert_eq!(notifier.messages.lock()[0].body, expected);
    }

    #[test]
    fn test_decide_is_pure() {
        let machine = AlertMachine::new(BTreeMap::new());
        let decision = machine.decide(&report(Some(2500.0)));
        assert_eq!(decision.next_state, AlertState::Alerting);
        assert_eq!(decision.command, Some(SwitchCommand::On));
        assert!(decision.message.is_some());
        assert_eq!(machine.state(), AlertState::Quiescent);
    }
}
