// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Notification transports for critical-value alerts

mod mqtt;
mod webhook;

pub use mqtt::*;
pub use webhook::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use anyhow::Result;
use tracing::{info, warn};

use crate::config::NotifyConfig;
use crate::error::{GasError, GasResult};

/// One alert message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(subject: &str, body: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            subject: subject.to_string(),
            body: body.to_string(),
            timestamp,
        }
    }
}

/// Outbound alert transport. Each call is a single attempt.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> GasResult<()>;

    fn name(&self) -> &str;
}

/// Writes alerts to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> GasResult<()> {
        for line in notification.body.lines() {
            warn!("[{}] {}", notification.subject, line);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Fans a notification out to every configured transport.
///
/// Each transport gets one attempt and its failure is logged on its own.
/// Succeeds when at least one transport delivered.
#[derive(Default)]
pub struct NotifierSet {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notifier: Box<dyn Notifier>) {
        info!("Registered notifier: {}", notifier.name());
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Build the transports named in the config
    pub async fn from_config(config: &NotifyConfig) -> Result<Self> {
        let mut set = Self::new();
        if config.log {
            set.push(Box::new(LogNotifier));
        }
        if let Some(mqtt) = &config.mqtt {
            let client = MqttClient::new(&mqtt.broker).await?;
            set.push(Box::new(MqttNotifier::new(client, &mqtt.topic)));
        }
        if let Some(webhook) = &config.webhook {
            set.push(Box::new(WebhookNotifier::new(webhook)?));
        }
        if set.is_empty() {
            warn!("No notification transports configured, alerts will only change the relay");
        }
        Ok(set)
    }
}

#[async_trait]
impl Notifier for NotifierSet {
    async fn notify(&self, notification: &Notification) -> GasResult<()> {
        let mut delivered = 0;
        let mut failures = Vec::new();

        for notifier in &self.notifiers {
            match notifier.notify(notification).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Notifier {} failed: {}", notifier.name(), e);
                    failures.push(format!("{}: {}", notifier.name(), e));
                }
            }
        }

        if delivered == 0 && !failures.is_empty() {
            return Err(GasError::TransportFailure(failures.join("; ")));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "all"
    }
}
