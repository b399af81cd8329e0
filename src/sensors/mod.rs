//! Sensor module - MQ sensor calibration, conversion and polling

pub mod calibration;
pub mod concentration;
pub mod curve;
mod manager;
mod traits;
mod simulator;

pub use calibration::{calibrate, sensor_resistance, sensor_voltage, RawSampleBatch, SensorCalibration};
pub use concentration::{estimate, ConcentrationEstimate};
pub use curve::{CurvePoint, CurveTable, GasCurve};
pub use manager::SensorManager;
pub use traits::{AnalogSource, EnvironmentSample, MetricKey, SensorHealth, SensorReading, SensorStatus};
pub use traits::ENVIRONMENT_METRICS;
pub use simulator::AnalogSimulator;
