// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! HTTP webhook notifier (chat hooks, mail relays, push gateways)

use std::time::Duration;
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::{Notification, Notifier};
use crate::config::WebhookConfig;
use crate::error::{GasError, GasResult};

/// POSTs alert messages as JSON
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> GasResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| GasError::TransportFailure(format!("webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GasError::TransportFailure(format!("webhook returned {}", status)));
        }
        debug!("Webhook accepted alert ({})", status);
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
