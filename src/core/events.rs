//! Internal event bus for request-time notifications
//!
//! The EventBus decouples the endpoint pipeline from whoever wants to observe
//! it. Authentication publishes the decoded claims; the built-in mutating
//! actions publish entity events after a successful commit.
//!
//! ```text
//! authenticate stage ──┐
//!                      ├──▶ EventBus::publish() ──▶ broadcast channel ──▶ subscribers
//! create/update/delete ┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let event_bus = EventBus::new(1024);
//! let mut rx = event_bus.subscribe();
//!
//! event_bus.publish(FrameworkEvent::Entity(EntityEvent::Created {
//!     entity_type: "widget".to_string(),
//!     entity_id: 1,
//!     data: json!({"name": "Sprocket"}),
//! }));
//!
//! if let Ok(envelope) = rx.recv().await {
//!     println!("Received: {:?}", envelope.event);
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events related to entity mutations (create, update, delete)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EntityEvent {
    Created {
        entity_type: String,
        entity_id: i64,
        data: Value,
    },
    Updated {
        entity_type: String,
        entity_id: i64,
        data: Value,
    },
    Deleted {
        entity_type: String,
        entity_id: i64,
    },
}

/// Top-level framework event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameworkEvent {
    /// A request presented a valid credential
    ClaimsDecoded { claims: Map<String, Value> },
    /// An entity was committed
    Entity(EntityEvent),
}

impl FrameworkEvent {
    pub fn event_kind(&self) -> &str {
        match self {
            FrameworkEvent::ClaimsDecoded { .. } => "claims_decoded",
            FrameworkEvent::Entity(_) => "entity",
        }
    }

    /// Get the entity type this event relates to
    pub fn entity_type(&self) -> Option<&str> {
        match self {
            FrameworkEvent::Entity(
                EntityEvent::Created { entity_type, .. }
                | EntityEvent::Updated { entity_type, .. }
                | EntityEvent::Deleted { entity_type, .. },
            ) => Some(entity_type),
            FrameworkEvent::ClaimsDecoded { .. } => None,
        }
    }

    /// Get the entity ID this event relates to (if applicable)
    pub fn entity_id(&self) -> Option<i64> {
        match self {
            FrameworkEvent::Entity(
                EntityEvent::Created { entity_id, .. }
                | EntityEvent::Updated { entity_id, .. }
                | EntityEvent::Deleted { entity_id, .. },
            ) => Some(*entity_id),
            FrameworkEvent::ClaimsDecoded { .. } => None,
        }
    }

    /// Get the action name (created, updated, deleted, decoded)
    pub fn action(&self) -> &str {
        match self {
            FrameworkEvent::Entity(EntityEvent::Created { .. }) => "created",
            FrameworkEvent::Entity(EntityEvent::Updated { .. }) => "updated",
            FrameworkEvent::Entity(EntityEvent::Deleted { .. }) => "deleted",
            FrameworkEvent::ClaimsDecoded { .. } => "decoded",
        }
    }
}

/// Envelope wrapping a framework event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: FrameworkEvent,
}

impl EventEnvelope {
    pub fn new(event: FrameworkEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Broadcast-based event bus
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events for slow receivers
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    ///
    /// Never fails. Returns the number of receivers that will see the event.
    pub fn publish(&self, event: FrameworkEvent) -> usize {
        let envelope = EventEnvelope::new(event);
        // send() only errors when nobody is listening
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Receive every event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_event_serialization() {
        let event = EntityEvent::Created {
            entity_type: "widget".to_string(),
            entity_id: 3,
            data: json!({"name": "Sprocket"}),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "created");
        assert_eq!(json["entity_type"], "widget");
        assert_eq!(json["entity_id"], 3);
    }

    #[test]
    fn test_claims_event_accessors() {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("user-1"));
        let event = FrameworkEvent::ClaimsDecoded { claims };

        assert_eq!(event.event_kind(), "claims_decoded");
        assert_eq!(event.action(), "decoded");
        assert_eq!(event.entity_type(), None);
        assert_eq!(event.entity_id(), None);
    }

    #[test]
    fn test_framework_event_entity_accessors() {
        let event = FrameworkEvent::Entity(EntityEvent::Updated {
            entity_type: "widget".to_string(),
            entity_id: 8,
            data: json!({"price": 10}),
        });

        assert_eq!(event.entity_type(), Some("widget"));
        assert_eq!(event.entity_id(), Some(8));
        assert_eq!(event.action(), "updated");
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let receivers = bus.publish(FrameworkEvent::Entity(EntityEvent::Deleted {
            entity_type: "widget".to_string(),
            entity_id: 5,
        }));
        assert_eq!(receivers, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event.entity_id(), Some(5));
        assert_eq!(received.event.action(), "deleted");
        assert!(!received.id.is_nil());
    }

    #[test]
    fn test_event_bus_publish_without_subscribers() {
        let bus = EventBus::default();
        let receivers = bus.publish(FrameworkEvent::ClaimsDecoded {
            claims: Map::new(),
        });
        assert_eq!(receivers, 0);
    }

    #[test]
    fn test_event_bus_clone_shares_channel() {
        let bus = EventBus::new(16);
        let _rx = bus.subscribe();
        let bus2 = bus.clone();
        assert_eq!(bus2.receiver_count(), 1);
    }
}
