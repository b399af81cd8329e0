// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Ventilation relay control

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ActuatorConfig, ActuatorKind};
use crate::error::GasResult;
use crate::notify::MqttClient;

/// Relay command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwitchCommand {
    On,
    Off,
}

impl SwitchCommand {
    /// Payload understood by Tasmota-style relays
    pub fn as_payload(&self) -> &'static str {
        match self {
            SwitchCommand::On => "ON",
            SwitchCommand::Off => "OFF",
        }
    }
}

impl std::fmt::Display for SwitchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_payload())
    }
}

/// Switchable ventilation device
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn switch(&self, command: SwitchCommand) -> GasResult<()>;

    fn name(&self) -> &str;
}

/// Logs switch commands without driving hardware
pub struct LogActuator;

#[async_trait]
impl Actuator for LogActuator {
    async fn switch(&self, command: SwitchCommand) -> GasResult<()> {
        info!("Ventilation switched {}", command);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Relay driven over MQTT. Commands are retained so a reconnecting
/// relay picks up the last state.
pub struct MqttRelay {
    client: MqttClient,
    topic: String,
}

impl MqttRelay {
    pub fn new(client: MqttClient, topic: &str) -> Self {
        Self {
            client,
            topic: topic.to_string(),
        }
    }
}

#[async_trait]
impl Actuator for MqttRelay {
    async fn switch(&self, command: SwitchCommand) -> GasResult<()> {
        self.client
            .publish_raw(&self.topic, command.as_payload().as_bytes(), true)
            .await?;
        info!("Relay {} <- {}", self.topic, command);
        Ok(())
    }

    fn name(&self) -> &str {
        "mqtt"
    }
}

/// Build the configured actuator
pub async fn from_config(config: &ActuatorConfig) -> Result<Box<dyn Actuator>> {
    match config.kind {
        ActuatorKind::Log => Ok(Box::new(LogActuator)),
        ActuatorKind::Mqtt => {
            let broker = config
                .mqtt
                .as_ref()
                .context("actuator.kind = \"mqtt\" requires an [actuator.mqtt] section")?;
            let client = MqttClient::new(broker).await?;
            Ok(Box::new(MqttRelay::new(client, &config.topic)))
        }
    }
}
