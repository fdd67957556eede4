use anyhow::{Context, Result};
use bus::{SharedBus, keys, publish};
use chrono::{DateTime, Utc};
use common::Backoff;
use rumqttc::{Client, ConnectionError, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::barrier::BarrierStatus;

const RECONNECT_BACKOFF: Backoff =
    Backoff::new(Duration::from_millis(100), Duration::from_secs(30)).with_jitter();

/// One barrier state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: BarrierStatus,
    pub previous: BarrierStatus,
    pub at: DateTime<Utc>,
}

impl Transition {
    pub fn new(status: BarrierStatus, previous: BarrierStatus) -> Self {
        Self {
            status,
            previous,
            at: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self.status {
            BarrierStatus::Up => "barrier_raised",
            BarrierStatus::Down => "barrier_lowered",
        }
    }
}

/// Physical or logical side effect of a barrier transition. Best-effort:
/// failures are logged by the implementation and never block the caller.
pub trait BarrierActuator: Send + Sync {
    fn apply(&self, transition: &Transition);
}

/// Mirrors the barrier state into the `barrier_status` bus key.
pub struct BusActuator {
    bus: SharedBus,
}

impl BusActuator {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }
}

impl BarrierActuator for BusActuator {
    fn apply(&self, transition: &Transition) {
        publish(
            self.bus.as_ref(),
            keys::BARRIER_STATUS,
            transition.status.as_str().as_bytes().to_vec(),
        );
    }
}

#[derive(Debug, Serialize)]
pub struct StateChangeNotification {
    pub device_id: String,
    pub timestamp: String,
    pub state: String,
    pub previous_state: Option<String>,
    pub event_type: String,
}

impl StateChangeNotification {
    fn new(device_id: &str, transition: &Transition) -> Self {
        Self {
            device_id: device_id.to_string(),
            timestamp: transition.at.to_rfc3339(),
            state: transition.status.as_str().to_string(),
            previous_state: Some(transition.previous.as_str().to_string()),
            event_type: transition.event_type().to_string(),
        }
    }
}

/// Publishes JSON state-change notifications to an MQTT broker.
pub struct MqttActuator {
    client: Client,
    topic: String,
    device_id: String,
    connected: Arc<AtomicBool>,
}

impl MqttActuator {
    pub fn new(broker_host: &str, broker_port: u16, topic: String, device_id: String) -> Result<Self> {
        let mut mqtt_options = MqttOptions::new(format!("gatekeeper-{device_id}"), broker_host, broker_port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));
        mqtt_options.set_clean_session(true);

        let (client, mut connection) = Client::new(mqtt_options, 10);
        let connected = Arc::new(AtomicBool::new(false));
        let connected_flag = Arc::clone(&connected);

        std::thread::Builder::new()
            .name("mqtt-events".into())
            .spawn(move || {
                let mut attempts = 0u32;
                loop {
                    for notification in connection.iter() {
                        match notification {
                            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                                connected_flag.store(true, Ordering::Release);
                                attempts = 0;
                                tracing::info!("MQTT connected to broker");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                connected_flag.store(false, Ordering::Release);
                                if matches!(e, ConnectionError::Io(_) | ConnectionError::NetworkTimeout) {
                                    let delay = RECONNECT_BACKOFF.delay_for_attempt(attempts);
                                    attempts = attempts.saturating_add(1);
                                    tracing::warn!(
                                        error = %e,
                                        attempt = attempts,
                                        backoff_ms = delay.as_millis(),
                                        "MQTT connection lost, reconnecting"
                                    );
                                    std::thread::sleep(delay);
                                } else {
                                    tracing::error!(error = %e, "MQTT error");
                                }
                            }
                        }
                    }

                    connected_flag.store(false, Ordering::Release);
                    let delay = RECONNECT_BACKOFF.delay_for_attempt(attempts);
                    attempts = attempts.saturating_add(1);
                    tracing::warn!(attempt = attempts, backoff_ms = delay.as_millis(), "MQTT connection closed");
                    std::thread::sleep(delay);
                }
            })
            .context("Failed to spawn MQTT event loop")?;

        tracing::info!(
            broker = %format!("{broker_host}:{broker_port}"),
            topic = %topic,
            device_id = %device_id,
            "MQTT actuator initialized"
        );

        Ok(Self {
            client,
            topic,
            device_id,
            connected,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn notify(&self, transition: &Transition) -> Result<()> {
        let notification = StateChangeNotification::new(&self.device_id, transition);
        let payload =
            serde_json::to_vec(&notification).context("Failed to serialize state change notification")?;
        self.client
            .try_publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .context("Failed to queue MQTT message")?;
        tracing::debug!(event_type = %notification.event_type, "Barrier notification queued");
        Ok(())
    }
}

impl BarrierActuator for MqttActuator {
    fn apply(&self, transition: &Transition) {
        if let Err(e) = self.notify(transition) {
            tracing::warn!(error = %e, connected = self.is_connected(), "Failed to send MQTT notification");
        }
    }
}
