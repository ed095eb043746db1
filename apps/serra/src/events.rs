//! # Event Bus
//!
//! Fan-out of state changes to live subscribers (the SSE endpoint).
//! Publishing never blocks; slow subscribers lose the oldest events.

use serde::Serialize;
use serra_core::{DeviceId, OutletId, SceneId, SensorId, SessionId, Timestamp, ZoneId};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Who asked for an outlet to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchSource {
    Manual,
    Automation,
}

/// Something that changed in the home.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HomeEvent {
    ReadingIngested {
        zone_id: ZoneId,
        sensor_id: SensorId,
        temperature: Option<f64>,
        humidity: Option<f64>,
        observed_at: Timestamp,
    },
    OutletSwitched {
        device_id: DeviceId,
        outlet_id: OutletId,
        state: bool,
        source: SwitchSource,
    },
    SceneEvaluated {
        zone_id: ZoneId,
        scene_id: SceneId,
        dry_run: bool,
        switched: usize,
        failed: usize,
    },
    SessionChanged {
        zone_id: ZoneId,
        session_id: SessionId,
        running: bool,
    },
    KillSwitchChanged {
        active: bool,
        reason: Option<String>,
    },
}

impl HomeEvent {
    /// SSE event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadingIngested { .. } => "reading_ingested",
            Self::OutletSwitched { .. } => "outlet_switched",
            Self::SceneEvaluated { .. } => "scene_evaluated",
            Self::SessionChanged { .. } => "session_changed",
            Self::KillSwitchChanged { .. } => "kill_switch_changed",
        }
    }
}

/// Cloneable handle to the broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HomeEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn publish(&self, event: HomeEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HomeEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(HomeEvent::KillSwitchChanged {
            active: true,
            reason: Some("leak".into()),
        });
        let event = rx.recv().await.expect("event");
        assert_eq!(event.name(), "kill_switch_changed");
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(HomeEvent::KillSwitchChanged {
            active: false,
            reason: None,
        });
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = HomeEvent::OutletSwitched {
            device_id: DeviceId(1),
            outlet_id: OutletId(3),
            state: true,
            source: SwitchSource::Automation,
        };
        let json = serde_json::to_value(&event).expect("json");
        assert_eq!(json["type"], "outlet_switched");
        assert_eq!(json["source"], "automation");
        assert_eq!(json["outlet_id"], 3);
    }
}
