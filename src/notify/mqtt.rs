// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! MQTT client shared by the alert notifier and the relay actuator

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use anyhow::Result;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn, debug};

use super::{Notification, Notifier};
use crate::config::MqttBrokerConfig;
use crate::error::{GasError, GasResult};

/// Outgoing request queue size
const REQUEST_CAPACITY: usize = 100;

/// MQTT client wrapper.
///
/// Publishing never waits on the network: it fails while no `ConnAck` has
/// been seen and when the outgoing queue is full.
#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    broker: String,
    port: u16,
}

impl MqttClient {
    /// Connect lazily; the event loop runs on a background task
    pub async fn new(config: &MqttBrokerConfig) -> Result<Self> {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let link = connected.clone();

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        link.store(true, Ordering::SeqCst);
                        info!("MQTT connected");
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        link.store(false, Ordering::SeqCst);
                        warn!("MQTT broker closed the session");
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        debug!("MQTT received: {:?}", msg.topic);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        link.store(false, Ordering::SeqCst);
                        warn!("MQTT error: {:?}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        info!("MQTT client initialized for {}:{}", config.broker, config.port);
        Ok(Self {
            client,
            connected,
            broker: config.broker.clone(),
            port: config.port,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn publish<T: Serialize>(&self, topic: &str, payload: &T, retain: bool) -> GasResult<()> {
        let json = serde_json::to_vec(payload)
            .map_err(|e| GasError::TransportFailure(format!("MQTT payload encoding failed: {}", e)))?;
        self.publish_raw(topic, &json, retain).await
    }

    pub async fn publish_raw(&self, topic: &str, payload: &[u8], retain: bool) -> GasResult<()> {
        if !self.is_connected() {
            return Err(GasError::TransportFailure(format!(
                "MQTT broker {}:{} is not connected",
                self.broker, self.port
            )));
        }

        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .map_err(|e| GasError::TransportFailure(format!("MQTT publish to {}:{} failed: {}", self.broker, self.port, e)))
    }
}

/// Publishes alert messages as JSON to a topic
pub struct MqttNotifier {
    client: MqttClient,
    topic: String,
}

impl MqttNotifier {
    pub fn new(client: MqttClient, topic: &str) -> Self {
        Self {
            client,
            topic: topic.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    async fn notify(&self, notification: &Notification) -> GasResult<()> {
        self.client.publish(&self.topic, notification, false).await
    }

    fn name(&self) -> &str {
        "mqtt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Nothing listens on port 1
    fn unreachable_broker() -> MqttBrokerConfig {
        MqttBrokerConfig {
            broker: "127.0.0.1".to_string(),
            port: 1,
            client_id: "airguard-test".to_string(),
            username: None,
            password: None,
        }
    }

    #[tokio::test]
    async fn test_publish_without_broker_fails() {
        let client = MqttClient::new(&unreachable_broker()).await.unwrap();
        assert!(!client.is_connected());

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            client.publish_raw("airguard/test", b"ON", true),
        )
        .await
        .expect("publish must not block");
        assert!(matches!(result, Err(GasError::TransportFailure(_))));
    }

    #[tokio::test]
    async fn test_notifier_keeps_failing_past_queue_capacity() {
        let client = MqttClient::new(&unreachable_broker()).await.unwrap();
        let notifier = MqttNotifier::new(client, "airguard/alerts");
        let notification = Notification::new("Critical value", "mq2_lpg 2100.00 ppm", Utc::now());

        for _ in 0..(REQUEST_CAPACITY * 2) {
            let result = tokio::time::timeout(Duration::from_secs(1), notifier.notify(&notification))
                .await
                .expect("notify must not block");
            assert!(matches!(result, Err(GasError::TransportFailure(_))));
        }
    }
}
