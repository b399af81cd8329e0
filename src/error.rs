// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Error taxonomy for the gas estimation core

use thiserror::Error;

pub type GasResult<T> = Result<T, GasError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GasError {
    /// Sensor fault: rail voltage, out-of-range sample or empty batch
    #[error("Invalid reading: {0}")]
    InvalidReading(String),

    /// Resistance ratio unusable for curve interpolation
    #[error("Invalid ratio: {0}")]
    InvalidRatio(String),

    /// Degenerate slope or clean-air ratio in configuration
    #[error("Division by zero: {0}")]
    DivisionByZero(String),

    /// Notification or actuation call failed
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    /// Malformed or out-of-range configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GasError {
    /// Configuration faults must stop the process before any cycle runs
    pub fn is_config_fault(&self) -> bool {
        matches!(
            self,
            GasError::DivisionByZero(_) | GasError::UnknownSensor(_) | GasError::InvalidConfig(_)
        )
    }
}
