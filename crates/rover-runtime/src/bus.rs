//! Typed, topic-based publish/subscribe bus for safety and housekeeping
//! events.
//!
//! Uses [`tokio::sync::broadcast`] so every subscriber sees every event and a
//! slow subscriber never blocks the publisher.
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::SafetyAlerts`] | Guard blocked/cleared edges, battery-critical shutdown |
//! | [`Topic::Telemetry`] | Periodic battery classification |

use rover_types::{Event, EventPayload, RoverError};
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    SafetyAlerts,
    Telemetry,
}

impl Topic {
    /// Lane an event payload is published on.
    pub fn for_payload(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::ObstacleDetected { .. }
            | EventPayload::PathClear { .. }
            | EventPayload::ShutdownInitiated { .. } => Topic::SafetyAlerts,
            EventPayload::Battery { .. } => Topic::Telemetry,
        }
    }
}

/// Shared event bus.  Clones share the same channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    safety_alerts: broadcast::Sender<Event>,
    telemetry: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (safety_alerts, _) = broadcast::channel(capacity);
        let (telemetry, _) = broadcast::channel(capacity);
        Self {
            safety_alerts,
            telemetry,
        }
    }

    /// Publish `event` on `topic`.
    ///
    /// Returns the number of subscribers handed the event; `Ok(0)` when
    /// nobody is listening.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, RoverError> {
        let sender = self.sender(topic);
        if sender.receiver_count() == 0 {
            return Ok(0);
        }
        sender
            .send(event)
            .map_err(|e| RoverError::Channel(format!("event bus send error on {topic:?}: {e}")))
    }

    /// Wrap `payload` in an [`Event`] from `source` and publish it on the
    /// payload's lane.  Failures are logged, never returned.
    pub fn emit(&self, source: &str, payload: EventPayload) {
        let topic = Topic::for_payload(&payload);
        if let Err(e) = self.publish_to(topic, Event::new(source, payload)) {
            warn!(error = %e, "dropping event");
        }
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.sender(topic).subscribe(),
        }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::SafetyAlerts => &self.safety_alerts,
            Topic::Telemetry => &self.telemetry,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiver bound to one [`Topic`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Next event on this topic, skipping over lag.  `None` once the bus is
    /// gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rover_types::BatteryStatus;

    use super::*;

    #[test]
    fn publish_without_subscribers_is_ok_zero() {
        let bus = EventBus::default();
        let event = Event::new("test", EventPayload::PathClear { distance_cm: 40.0 });
        assert_eq!(bus.publish_to(Topic::SafetyAlerts, event).unwrap(), 0);
    }

    #[tokio::test]
    async fn emit_routes_by_payload() {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SafetyAlerts);
        let mut telemetry = bus.subscribe_to(Topic::Telemetry);

        bus.emit(
            "battery",
            EventPayload::Battery {
                status: BatteryStatus::Ok,
                voltage: 12.4,
            },
        );
        bus.emit("guard", EventPayload::ObstacleDetected { distance_cm: 12.0 });

        let t = telemetry.recv().await.unwrap();
        assert_eq!(t.source, "battery");
        let a = alerts.recv().await.unwrap();
        assert_eq!(
            a.payload,
            EventPayload::ObstacleDetected { distance_cm: 12.0 }
        );

        let nothing = tokio::time::timeout(Duration::from_millis(20), telemetry.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn every_subscriber_sees_the_event() {
        let bus = EventBus::default();
        let mut first = bus.subscribe_to(Topic::SafetyAlerts);
        let mut second = bus.subscribe_to(Topic::SafetyAlerts);
        let event = Event::new("test", EventPayload::ShutdownInitiated { voltage: 10.1 });
        assert_eq!(bus.publish_to(Topic::SafetyAlerts, event.clone()).unwrap(), 2);
        assert_eq!(first.recv().await.unwrap().id, event.id);
        assert_eq!(second.recv().await.unwrap().id, event.id);
        assert_eq!(first.topic(), Topic::SafetyAlerts);
    }
}
