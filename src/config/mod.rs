// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Configuration module

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::AlertRule;
use crate::error::{GasError, GasResult};
use crate::sensors::calibration::check_clean_air_ratio;
use crate::sensors::{CurvePoint, CurveTable, ENVIRONMENT_METRICS};

/// Longest accepted alert interval or window: one year
pub const MAX_WINDOW_MINUTES: u64 = 525_600;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,

    /// Enable demo mode (simulated analog input)
    pub demo_mode: bool,

    /// ADC board constants
    pub board: BoardConfig,

    /// Batch sizes and sub-intervals
    pub sampling: SamplingConfig,

    /// MQ sensors by id
    pub sensors: BTreeMap<String, MqSensorConfig>,

    /// Temperature, pressure and humidity sensor
    pub environment: EnvironmentConfig,

    /// Datasheet curves: `curves.<sensor>.<gas>`
    pub curves: BTreeMap<String, BTreeMap<String, CurvePoint>>,

    /// Alert rules and scan interval
    pub alerts: AlertConfig,

    /// Notification transports
    pub notify: NotifyConfig,

    /// Ventilation relay
    pub actuator: ActuatorConfig,

    /// Database configuration
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            demo_mode: false,
            board: BoardConfig::default(),
            sampling: SamplingConfig::default(),
            sensors: default_sensors(),
            environment: EnvironmentConfig::default(),
            curves: default_curves(),
            alerts: AlertConfig::default(),
            notify: NotifyConfig::default(),
            actuator: ActuatorConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("airguard"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Check every configuration invariant and build the curve table.
    ///
    /// Any error here is a configuration fault and must stop startup.
    pub fn validate(&self) -> GasResult<CurveTable> {
        self.board.validate()?;
        self.sampling.validate()?;

        if self.sensors.is_empty() {
            return Err(GasError::UnknownSensor("no sensors configured".to_string()));
        }

        let curves = CurveTable::from_points(&self.curves)?;

        for (id, sensor) in &self.sensors {
            check_clean_air_ratio(id, sensor.clean_air_ratio)?;
            if let Some(r0) = sensor.r0 {
                if r0 <= 0.0 || !r0.is_finite() {
                    return Err(GasError::DivisionByZero(format!("{}: configured r0 must be positive, got {}", id, r0)));
                }
            }
            if !curves.has_sensor(id) {
                return Err(GasError::UnknownSensor(format!("sensor {} has no curves", id)));
            }
        }

        for sensor in curves.sensors() {
            if !self.sensors.contains_key(sensor) {
                warn!("Curves defined for unconfigured sensor {}", sensor);
            }
        }

        if self.environment.enabled && self.sensors.contains_key(&self.environment.id) {
            return Err(GasError::InvalidConfig(format!(
                "environment id {} is also an MQ sensor id",
                self.environment.id
            )));
        }

        for rule in &self.alerts.rules {
            if rule.upper_bound.is_nan() || rule.lower_bound.map(f64::is_nan).unwrap_or(false) {
                return Err(GasError::InvalidConfig(format!("{}: alert bounds must be numbers", rule.metric())));
            }
            let known = if self.environment.enabled && rule.sensor == self.environment.id {
                ENVIRONMENT_METRICS.contains(&rule.gas.as_str())
            } else {
                curves.get(&rule.sensor, &rule.gas).is_some()
            };
            if !known {
                return Err(GasError::UnknownSensor(format!("alert rule references unknown metric {}", rule.metric())));
            }
        }

        self.alerts.validate()?;

        Ok(curves)
    }
}

/// ADC board constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Circuit voltage (VC)
    pub circuit_voltage: f64,
    /// Maximum output value of an analog read (AR_MAX)
    pub analog_read_max: u16,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            circuit_voltage: 5.0,
            analog_read_max: 1023,
        }
    }
}

impl BoardConfig {
    pub fn validate(&self) -> GasResult<()> {
        if self.circuit_voltage <= 0.0 || !self.circuit_voltage.is_finite() {
            return Err(GasError::DivisionByZero(format!(
                "board.circuit_voltage must be positive, got {}",
                self.circuit_voltage
            )));
        }
        if self.analog_read_max == 0 {
            return Err(GasError::DivisionByZero("board.analog_read_max must be positive".to_string()));
        }
        Ok(())
    }
}

/// Sensor reading parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Number of reads averaged for R0
    pub calibration_samples: usize,
    /// Milliseconds between R0 reads
    pub calibration_interval_ms: u64,
    /// Number of reads averaged per runtime reading
    pub runtime_samples: usize,
    /// Milliseconds between runtime reads
    pub runtime_interval_ms: u64,
    /// Seconds between stored readings
    pub storage_interval_secs: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            calibration_samples: 50,
            calibration_interval_ms: 500,
            runtime_samples: 5,
            runtime_interval_ms: 50,
            storage_interval_secs: 60,
        }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> GasResult<()> {
        if self.calibration_samples == 0 || self.runtime_samples == 0 {
            return Err(GasError::DivisionByZero("sampling batch sizes must be positive".to_string()));
        }
        if self.storage_interval_secs == 0 {
            return Err(GasError::DivisionByZero("sampling.storage_interval_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn calibration_interval(&self) -> Duration {
        Duration::from_millis(self.calibration_interval_ms)
    }

    pub fn runtime_interval(&self) -> Duration {
        Duration::from_millis(self.runtime_interval_ms)
    }

    pub fn storage_interval(&self) -> Duration {
        Duration::from_secs(self.storage_interval_secs)
    }
}

/// One MQ sensor on the analog bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqSensorConfig {
    /// Analog port number
    pub pin: u8,
    /// Rs/R0 in clean air, from the datasheet
    pub clean_air_ratio: f64,
    /// Measured R0, if calibrated outside the database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r0: Option<f64>,
}

/// Climate sensor read alongside the MQ array
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub enabled: bool,
    /// Sensor id used for the `temperature`, `pressure` and `humidity` metrics
    pub id: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            id: "bme680".to_string(),
        }
    }
}

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minutes between critical-value scans
    pub interval_minutes: u64,
    /// Trailing window scanned each cycle; defaults to the interval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_minutes: Option<u64>,
    pub rules: Vec<AlertRule>,
    /// Unit string per gas; gases not listed use `ppm`
    pub units: BTreeMap<String, String>,
    /// Print alert times in local time instead of UTC
    pub local_time: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            window_minutes: None,
            rules: vec![
                // https://en.wikipedia.org/wiki/Liquefied_petroleum_gas
                AlertRule::upper("mq2", "lpg", 2000.0),
                // https://en.wikipedia.org/wiki/Carbon_monoxide_poisoning
                AlertRule::upper("mq2", "co", 1000.0),
                AlertRule::upper("bme680", "temperature", 24.0).with_lower(16.0),
                AlertRule::upper("bme680", "humidity", 60.0).with_lower(30.0),
            ],
            units: default_units(),
            local_time: true,
        }
    }
}

fn default_units() -> BTreeMap<String, String> {
    [("temperature", "Celsius"), ("humidity", "%"), ("pressure", "hPa")]
        .iter()
        .map(|(metric, unit)| (metric.to_string(), unit.to_string()))
        .collect()
}

impl AlertConfig {
    pub fn validate(&self) -> GasResult<()> {
        if self.interval_minutes == 0 {
            return Err(GasError::DivisionByZero("alerts.interval_minutes must be positive".to_string()));
        }
        if self.interval_minutes > MAX_WINDOW_MINUTES {
            return Err(GasError::InvalidConfig(format!(
                "alerts.interval_minutes must be at most {}, got {}",
                MAX_WINDOW_MINUTES, self.interval_minutes
            )));
        }
        match self.window_minutes {
            Some(0) => Err(GasError::InvalidConfig("alerts.window_minutes must be positive".to_string())),
            Some(m) if m > MAX_WINDOW_MINUTES => Err(GasError::InvalidConfig(format!(
                "alerts.window_minutes must be at most {}, got {}",
                MAX_WINDOW_MINUTES, m
            ))),
            _ => Ok(()),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.min(MAX_WINDOW_MINUTES) * 60)
    }

    /// Clamped to `MAX_WINDOW_MINUTES` so an unvalidated config cannot overflow
    pub fn window(&self) -> chrono::Duration {
        let minutes = self.window_minutes.unwrap_or(self.interval_minutes).min(MAX_WINDOW_MINUTES);
        chrono::Duration::minutes(minutes as i64)
    }

    pub fn unit_for(&self, gas: &str) -> &str {
        self.units.get(gas).map(|u| u.as_str()).unwrap_or("ppm")
    }
}

/// Notification transports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Always log alert messages
    pub log: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<MqttNotifyConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            log: true,
            mqtt: None,
            webhook: None,
        }
    }
}

/// MQTT broker connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttBrokerConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for MqttBrokerConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "airguard".to_string(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttNotifyConfig {
    /// Topic alert messages are published to
    pub topic: String,
    pub broker: MqttBrokerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Request timeout in seconds
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    10
}

/// Ventilation relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub kind: ActuatorKind,
    /// Relay command topic, e.g. a Tasmota `cmnd/<device>/POWER`
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<MqttBrokerConfig>,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            kind: ActuatorKind::Log,
            topic: "cmnd/ventilation/POWER".to_string(),
            mqtt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    Log,
    Mqtt,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database path
    pub path: PathBuf,

    /// Retention period in days
    pub retention_days: u32,

    /// Seconds between retention sweeps while running
    pub cleanup_interval_secs: u64,
}

impl DatabaseConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days as i64)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/airguard.db"),
            retention_days: 30,
            cleanup_interval_secs: 3600,
        }
    }
}

fn default_sensors() -> BTreeMap<String, MqSensorConfig> {
    // http://wiki.seeedstudio.com/Grove-Gas_Sensor-MQ2/
    // http://wiki.seeedstudio.com/Grove-Gas_Sensor-MQ9/
    // http://wiki.seeedstudio.com/Grove-Gas_Sensor-MQ5/
    let mut sensors = BTreeMap::new();
    sensors.insert("mq2".to_string(), MqSensorConfig { pin: 0, clean_air_ratio: 9.48, r0: None });
    sensors.insert("mq9".to_string(), MqSensorConfig { pin: 1, clean_air_ratio: 9.74, r0: None });
    sensors.insert("mq5".to_string(), MqSensorConfig { pin: 2, clean_air_ratio: 6.45, r0: None });
    sensors
}

fn default_curves() -> BTreeMap<String, BTreeMap<String, CurvePoint>> {
    // Digitized from the MQ-2, MQ-5 and MQ-9 datasheet sensitivity plots
    let table: [(&str, &[(&str, f64, f64)]); 3] = [
        ("mq2", &[
            ("co", 0.72, -0.34),
            ("smoke", 0.53, -0.44),
            ("ch4", 0.49, -0.38),
            ("alcohol", 0.45, -0.37),
            ("h2", 0.32, -0.47),
            ("propane", 0.23, -0.46),
            ("lpg", 0.21, -0.47),
        ]),
        ("mq5", &[
            ("co", 0.59, -0.13),
            ("alcohol", 0.55, -0.23),
            ("h2", 0.24, -0.25),
            ("ch4", -0.02, -0.4),
            ("lpg", -0.15, -0.41),
        ]),
        ("mq9", &[
            ("ch4", 0.49, -0.38),
            ("lpg", 0.31, -0.47),
            ("co", 0.21, -0.44),
        ]),
    ];

    table
        .iter()
        .map(|(sensor, gases)| {
            let curves = gases
                .iter()
                .map(|(gas, y, slope)| (gas.to_string(), CurvePoint { x: 2.3, y: *y, slope: *slope }))
                .collect();
            (sensor.to_string(), curves)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        let curves = config.validate().unwrap();
        assert_eq!(curves.len(), 15);
        assert_eq!(curves.get("mq9", "co").unwrap().reference_y(), 0.21);
    }

    #[test]
    fn test_round_trip_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.sensors.len(), 3);
        assert_eq!(parsed.alerts.rules.len(), 4);
        assert_eq!(parsed.alerts.unit_for("humidity"), "%");
        assert_eq!(parsed.board, config.board);
        parsed.validate().unwrap();
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [board]
            circuit_voltage = 3.3
            analog_read_max = 4095

            [alerts]
            interval_minutes = 15
            "#,
        )
        .unwrap();
        assert_eq!(config.board.analog_read_max, 4095);
        assert_eq!(config.alerts.window(), chrono::Duration::minutes(15));
        assert_eq!(config.sampling.runtime_samples, 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_slope_fails_validation() {
        let mut config = Config::default();
        config.curves.get_mut("mq2").unwrap().get_mut("co").unwrap().slope = 0.0;
        assert!(matches!(config.validate(), Err(GasError::DivisionByZero(_))));
    }

    #[test]
    fn test_bad_clean_air_ratio_fails_validation() {
        let mut config = Config::default();
        config.sensors.get_mut("mq5").unwrap().clean_air_ratio = 0.0;
        assert!(matches!(config.validate(), Err(GasError::DivisionByZero(_))));
    }

    #[test]
    fn test_rule_for_unknown_metric_fails_validation() {
        let mut config = Config::default();
        config.alerts.rules.push(AlertRule::upper("mq2", "hexane", 2500.0));
        let err = config.validate().unwrap_err();
        assert!(err.is_config_fault());
    }

    #[test]
    fn test_sensor_without_curves_fails_validation() {
        let mut config = Config::default();
        config.sensors.insert("mq135".to_string(), MqSensorConfig { pin: 3, clean_air_ratio: 3.6, r0: None });
        assert!(matches!(config.validate(), Err(GasError::UnknownSensor(_))));
    }

    #[test]
    fn test_units_default_to_ppm() {
        let mut alerts = AlertConfig::default();
        alerts.units.insert("temperature".to_string(), "Celsius".to_string());
        assert_eq!(alerts.unit_for("lpg"), "ppm");
        assert_eq!(alerts.unit_for("temperature"), "Celsius");
    }

    #[test]
    fn test_default_environment_rules_are_banded() {
        let config = Config::default();
        let humidity = config
            .alerts
            .rules
            .iter()
            .find(|r| r.sensor == "bme680" && r.gas == "humidity")
            .unwrap();
        assert_eq!(humidity.upper_bound, 60.0);
        assert_eq!(humidity.lower_bound, Some(30.0));
        assert_eq!(config.alerts.unit_for("temperature"), "Celsius");
        assert_eq!(config.alerts.unit_for("pressure"), "hPa");
    }

    #[test]
    fn test_environment_rule_needs_known_metric() {
        let mut config = Config::default();
        config.alerts.rules.push(AlertRule::upper("bme680", "pressure", 1050.0).with_lower(950.0));
        config.validate().unwrap();

        config.alerts.rules.push(AlertRule::upper("bme680", "voc", 10.0));
        assert!(matches!(config.validate(), Err(GasError::UnknownSensor(_))));
    }

    #[test]
    fn test_environment_rules_rejected_when_disabled() {
        let mut config = Config::default();
        config.environment.enabled = false;
        assert!(matches!(config.validate(), Err(GasError::UnknownSensor(_))));
    }

    #[test]
    fn test_environment_id_must_not_shadow_mq_sensor() {
        let mut config = Config::default();
        config.environment.id = "mq2".to_string();
        config.alerts.rules.retain(|r| r.sensor != "bme680");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, GasError::InvalidConfig(_)));
        assert!(err.is_config_fault());
    }

    #[test]
    fn test_nan_bound_is_config_fault() {
        let mut config = Config::default();
        config.alerts.rules.push(AlertRule::upper("mq2", "smoke", 500.0).with_lower(f64::NAN));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, GasError::InvalidConfig(_)));
        assert!(err.is_config_fault());
    }

    #[test]
    fn test_huge_window_rejected_without_panic() {
        let mut config = Config::default();
        config.alerts.window_minutes = Some(u64::MAX);
        assert_eq!(config.alerts.window(), chrono::Duration::minutes(MAX_WINDOW_MINUTES as i64));
        assert!(matches!(config.validate(), Err(GasError::InvalidConfig(_))));

        config.alerts.window_minutes = None;
        config.alerts.interval_minutes = u64::MAX;
        assert_eq!(config.alerts.interval(), Duration::from_secs(MAX_WINDOW_MINUTES * 60));
        assert!(config.validate().unwrap_err().is_config_fault());
    }
}
