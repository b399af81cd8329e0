// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! airguard - MQ gas sensor monitoring and ventilation control
//!
//! Calibrates MQ-series sensors in clean air, converts their analog output
//! into ppm per gas using datasheet curves, stores the readings and, once per
//! alert interval, scans the recent window for critical values. A critical
//! value switches the ventilation relay on and sends an alert; a clean window
//! switches it off again.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │ AnalogSource │ → │ SensorManager │ → │ ReadingStore │
//! └──────────────┘   │ (R0, ppm)     │   └──────┬───────┘
//!                    └───────────────┘          ↓
//!                    ┌──────────────┐   ┌───────────────┐
//!                    │ Notifier /   │ ← │ scan +        │
//!                    │ Actuator     │   │ AlertMachine  │
//!                    └──────────────┘   └───────────────┘
//! ```

pub mod core;
pub mod sensors;
pub mod detection;
pub mod notify;
pub mod actuator;
pub mod config;
pub mod db;
pub mod error;

// Re-exports for convenience
pub use config::Config;
pub use core::Monitor;
pub use sensors::{SensorManager, SensorReading, MetricKey};
pub use detection::{scan, AlertMachine, AlertRule};
pub use db::{Database, MemoryStore, ReadingStore};
pub use error::{GasError, GasResult};

/// airguard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// airguard name
pub const NAME: &str = "airguard";
