//! Resolution events
//!
//! The resolver reports what it does through [`FeatureEvent`]s delivered to
//! an optional [`EventListener`]. Listeners are called inline, after the
//! operation they describe has completed.

use crate::value::{FeatureValue, Payload};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

/// Something the resolver did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeatureEvent {
    /// A defined feature was resolved for a context for the first time in this unit of work
    Resolved {
        feature: String,
        context_key: String,
        value: FeatureValue,
    },
    /// A feature without definition was resolved
    UnknownFeatureResolved { feature: String, context_key: String },
    /// A value was written for one context
    Updated {
        feature: String,
        context_key: String,
        value: Payload,
    },
    /// A value was written for every stored context
    UpdatedForAll { feature: String, value: Payload },
    /// A stored value was removed
    Deleted { feature: String, context_key: String },
    /// Stored values were purged; `None` means everything
    Purged { features: Option<Vec<String>> },
    /// A dependency chain came back to a frame already in flight
    CycleDetected { feature: String, path: Vec<String> },
    /// A first write lost a race and the read was retried
    RaceRetried { feature: String, context_key: String },
}

impl FeatureEvent {
    /// Event name
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Resolved { .. } => "resolved",
            Self::UnknownFeatureResolved { .. } => "unknown_feature_resolved",
            Self::Updated { .. } => "updated",
            Self::UpdatedForAll { .. } => "updated_for_all",
            Self::Deleted { .. } => "deleted",
            Self::Purged { .. } => "purged",
            Self::CycleDetected { .. } => "cycle_detected",
            Self::RaceRetried { .. } => "race_retried",
        }
    }

    /// Feature the event is about, if it concerns a single feature
    pub fn feature(&self) -> Option<&str> {
        match self {
            Self::Resolved { feature, .. }
            | Self::UnknownFeatureResolved { feature, .. }
            | Self::Updated { feature, .. }
            | Self::UpdatedForAll { feature, .. }
            | Self::Deleted { feature, .. }
            | Self::CycleDetected { feature, .. }
            | Self::RaceRetried { feature, .. } => Some(feature),
            Self::Purged { .. } => None,
        }
    }
}

/// Receives resolver events
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Handle one event
    async fn handle(&self, event: &FeatureEvent);
}

/// Listener that keeps every event it receives.
#[derive(Debug, Default)]
pub struct CollectingListener {
    events: Mutex<Vec<FeatureEvent>>,
}

impl CollectingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the received events
    pub fn events(&self) -> Vec<FeatureEvent> {
        self.events.lock().clone()
    }

    /// Number of received events with the given name
    pub fn count(&self, event_name: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_name() == event_name)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl EventListener for CollectingListener {
    async fn handle(&self, event: &FeatureEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_collecting_listener() {
        let listener = CollectingListener::new();
        listener
            .handle(&FeatureEvent::Deleted {
                feature: "new-ui".to_string(),
                context_key: "User|1".to_string(),
            })
            .await;
        listener
            .handle(&FeatureEvent::Purged { features: None })
            .await;

        assert_eq!(listener.events().len(), 2);
        assert_eq!(listener.count("deleted"), 1);
        assert_eq!(listener.events()[0].feature(), Some("new-ui"));
        assert_eq!(listener.events()[1].feature(), None);

        listener.clear();
        assert!(listener.events().is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let event = FeatureEvent::UpdatedForAll {
            feature: "banner".to_string(),
            value: json!("spring"),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "updated_for_all", "feature": "banner", "value": "spring"})
        );
    }
}
