//! Event bus feeding the browser-facing UIBroadcaster: roster snapshots,
//! system log lines, per-team log lines, and ML prediction request images.

use crate::error::AppError;
use crate::robot::RobotSnapshot;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Events broadcast to every connected browser UI websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// Full roster snapshot, sent on every registry change.
    Roster { robots: Vec<RobotSnapshot> },
    /// A line for the system log panel, tagged with a severity.
    SystemLog {
        level: String,
        message: String,
        timestamp: SystemTime,
    },
    /// A line appended to one team's own log panel via `print`.
    TeamLog {
        team_name: String,
        message: String,
        timestamp: SystemTime,
    },
    /// The JPEG a team submitted with a `prediction_request`, for display.
    PredictionRequest {
        team_name: String,
        index: i64,
        #[serde(with = "base64_bytes")]
        frame: Vec<u8>,
    },
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

/// Broadcast-backed event bus. Slow or absent subscribers never block a
/// publisher; `tokio::sync::broadcast` drops the oldest entry instead.
pub struct UiBroadcaster {
    sender: broadcast::Sender<UiEvent>,
}

impl UiBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to every subscriber. Returns the number reached;
    /// zero subscribers is not an error, since no browser may be connected.
    pub fn publish(&self, event: UiEvent) -> usize {
        match &event {
            UiEvent::SystemLog { level, message, .. } => {
                debug!(level = %level, "system log: {}", message);
            }
            UiEvent::TeamLog {
                team_name, message, ..
            } => {
                debug!(team = %team_name, "team log: {}", message);
            }
            _ => {}
        }

        match self.sender.send(event) {
            Ok(n) => n,
            Err(_) => 0,
        }
    }

    pub fn log(&self, level: tracing::Level, message: impl Into<String>) {
        self.publish(UiEvent::SystemLog {
            level: level.to_string(),
            message: message.into(),
            timestamp: SystemTime::now(),
        });
    }

    /// Log an `AppError` at its own severity and forward it to the UI.
    pub fn log_error(&self, err: &AppError) {
        let level = err.severity().to_tracing_level();
        match level {
            tracing::Level::ERROR => tracing::error!("{err}"),
            tracing::Level::WARN => tracing::warn!("{err}"),
            _ => tracing::debug!("{err}"),
        }
        self.log(level, err.to_string());
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// `tracing` layer that mirrors ERROR/WARN/INFO events into the UI system
/// log, so the web console shows the same story as stderr.
pub struct WebSinkLayer {
    broadcaster: std::sync::Arc<UiBroadcaster>,
}

impl WebSinkLayer {
    pub fn new(broadcaster: std::sync::Arc<UiBroadcaster>) -> Self {
        Self { broadcaster }
    }
}

impl<S> tracing_subscriber::Layer<S> for WebSinkLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        if *event.metadata().level() > tracing::Level::INFO {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if visitor.message.is_empty() {
            return;
        }
        self.broadcaster
            .publish(UiEvent::SystemLog {
                level: event.metadata().level().to_string(),
                message: visitor.message,
                timestamp: SystemTime::now(),
            });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

pub fn warn_unregistered_but_invisible_aruco(team_name: &str, requested_id: i32) {
    warn!(
        team = %team_name,
        marker_id = requested_id,
        "aruco query for a marker id not currently visible to the camera"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_with_no_subscribers_returns_zero() {
        let bus = UiBroadcaster::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(UiEvent::TeamLog {
            team_name: "Alpha".into(),
            message: "hello".into(),
            timestamp: SystemTime::now(),
        }), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = UiBroadcaster::new(16);
        let mut rx = bus.subscribe();
        bus.log(tracing::Level::INFO, "hello");
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, UiEvent::SystemLog { .. }));
    }
}
