use crate::budget::{DegradeHint, ResourceBudget};
use crate::detection::LoopState;
use crate::device::DeviceProfile;
use crate::error::EventBusError;
use crate::host::HostEnvironmentInfo;
use crate::storage::TokenSource;

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events emitted while the runtime classifies, resolves and runs detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RuntimeEvent {
    /// The device was assigned a tier
    DeviceClassified {
        profile: DeviceProfile,
        timestamp: SystemTime,
    },
    /// The embedding host was identified
    HostClassified {
        host: HostEnvironmentInfo,
        timestamp: SystemTime,
    },
    /// A resource budget was resolved
    BudgetResolved {
        budget: ResourceBudget,
        timestamp: SystemTime,
    },
    /// The detection loop moved between states
    DetectionStateChanged { from: LoopState, to: LoopState },
    /// The face pipeline could not be initialized
    PipelineInitFailed { details: String },
    /// Face presence flipped between frames
    FacePresenceChanged { present: bool },
    /// Sustained poor performance was observed on the running loop
    DegradeDetected {
        hint: DegradeHint,
        timestamp: SystemTime,
    },
    /// User-facing performance advice changed
    PerformanceSuggestion { message: String },
    /// A session recovery token was found in one of the replicas
    SessionRecovered {
        source: TokenSource,
        consistent: bool,
    },
    /// A component reported an absorbed error
    SystemError { component: String, error: String },
    /// Runtime shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl RuntimeEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            RuntimeEvent::DeviceClassified { profile, .. } => {
                format!("Device {} classified as {}", profile.model, profile.tier)
            }
            RuntimeEvent::HostClassified { host, .. } => {
                if host.is_embedded {
                    format!(
                        "Embedded in {}",
                        host.host.map_or("an unidentified app", |name| name.display_name())
                    )
                } else {
                    "Standalone browser".to_string()
                }
            }
            RuntimeEvent::BudgetResolved { budget, .. } => format!(
                "Budget {}x{} @ {}fps ({} tier)",
                budget.capture_resolution.width,
                budget.capture_resolution.height,
                budget.frame_rate_ceiling,
                budget.tier
            ),
            RuntimeEvent::DetectionStateChanged { from, to } => {
                format!("Detection loop {} -> {}", from, to)
            }
            RuntimeEvent::PipelineInitFailed { details } => {
                format!("Pipeline initialization failed: {}", details)
            }
            RuntimeEvent::FacePresenceChanged { present } => {
                format!("Face {}", if *present { "present" } else { "absent" })
            }
            RuntimeEvent::DegradeDetected { hint, .. } => {
                format!("Degrade detected ({:?}, {:.1} fps)", hint.reason, hint.observed_fps)
            }
            RuntimeEvent::PerformanceSuggestion { message } => message.clone(),
            RuntimeEvent::SessionRecovered { source, consistent } => format!(
                "Session recovered from {:?}{}",
                source,
                if *consistent { "" } else { " (replicas diverge)" }
            ),
            RuntimeEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            RuntimeEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            RuntimeEvent::DeviceClassified { .. } => "device_classified",
            RuntimeEvent::HostClassified { .. } => "host_classified",
            RuntimeEvent::BudgetResolved { .. } => "budget_resolved",
            RuntimeEvent::DetectionStateChanged { .. } => "detection_state_changed",
            RuntimeEvent::PipelineInitFailed { .. } => "pipeline_init_failed",
            RuntimeEvent::FacePresenceChanged { .. } => "face_presence_changed",
            RuntimeEvent::DegradeDetected { .. } => "degrade_detected",
            RuntimeEvent::PerformanceSuggestion { .. } => "performance_suggestion",
            RuntimeEvent::SessionRecovered { .. } => "session_recovered",
            RuntimeEvent::SystemError { .. } => "system_error",
            RuntimeEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Broadcast bus shared by the runtime components
pub struct EventBus {
    sender: broadcast::Sender<RuntimeEvent>,
    debug_logging: bool,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            debug_logging: false,
        }
    }

    pub fn with_debug_logging(capacity: usize) -> Self {
        Self {
            debug_logging: true,
            ..Self::new(capacity)
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.sender.subscribe()
    }

    /// Subscribe through a filter
    pub fn subscribe_filtered<S: Into<String>>(&self, filter: EventFilter, name: S) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.into())
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: RuntimeEvent) -> Result<usize, EventBusError> {
        self.log_event(&event);
        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish from synchronous code, treating an absent audience as success
    pub fn notify(&self, event: RuntimeEvent) {
        self.log_event(&event);
        if self.sender.send(event).is_err() {
            debug!("No subscribers for event");
        }
    }

    fn log_event(&self, event: &RuntimeEvent) {
        match event {
            RuntimeEvent::PipelineInitFailed { details } => {
                error!("Pipeline initialization failed: {}", details);
            }
            RuntimeEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            RuntimeEvent::DegradeDetected { hint, .. } => {
                warn!(reason = ?hint.reason, fps = hint.observed_fps, "Sustained poor performance");
            }
            RuntimeEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
    /// Only `SystemError` events from these components
    Components(Vec<String>),
    Custom(fn(&RuntimeEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &RuntimeEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Components(components) => {
                if let RuntimeEvent::SystemError { component, .. } = event {
                    components.contains(component)
                } else {
                    false
                }
            }
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Named receiver that skips events its filter rejects
pub struct EventReceiver {
    receiver: broadcast::Receiver<RuntimeEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<RuntimeEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    pub async fn recv(&mut self) -> Result<RuntimeEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!("Receiver '{}' received event: {}", self.name, event.description());
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Next matching event already queued, if any
    pub fn try_recv(&mut self) -> Result<Option<RuntimeEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn shutdown(reason: &str) -> RuntimeEvent {
        RuntimeEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: reason.to_string(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let count = event_bus
            .publish(RuntimeEvent::FacePresenceChanged { present: true })
            .await
            .unwrap();
        assert_eq!(count, 1);

        match receiver.recv().await.unwrap() {
            RuntimeEvent::FacePresenceChanged { present } => assert!(present),
            other => panic!("Unexpected event type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(4);
        assert!(event_bus.publish(shutdown("test")).await.is_err());

        // notify swallows the missing audience
        event_bus.notify(shutdown("test"));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(shutdown("both")).await.unwrap();

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::EventTypes(vec!["degrade_detected", "shutdown_requested"]);

        assert!(filter.matches(&shutdown("x")));
        assert!(!filter.matches(&RuntimeEvent::FacePresenceChanged { present: false }));

        let components = EventFilter::Components(vec!["storage".to_string()]);
        assert!(components.matches(&RuntimeEvent::SystemError {
            component: "storage".to_string(),
            error: "boom".to_string(),
        }));
        assert!(!components.matches(&shutdown("x")));
    }

    #[test]
    fn test_host_description() {
        let describe = |ua: &str| {
            RuntimeEvent::HostClassified {
                host: crate::host::classify_host(ua),
                timestamp: SystemTime::now(),
            }
            .description()
        };

        assert_eq!(
            describe("Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Instagram 250.0.0.21.109"),
            "Embedded in Instagram"
        );
        assert_eq!(
            describe("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"),
            "Standalone browser"
        );

        let mut unnamed = crate::host::classify_host("");
        unnamed.is_embedded = true;
        unnamed.host = None;
        let event = RuntimeEvent::HostClassified {
            host: unnamed,
            timestamp: SystemTime::now(),
        };
        assert_eq!(event.description(), "Embedded in an unidentified app");
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut filtered =
            event_bus.subscribe_filtered(EventFilter::EventTypes(vec!["shutdown_requested"]), "test");

        event_bus
            .publish(RuntimeEvent::FacePresenceChanged { present: true })
            .await
            .unwrap();
        event_bus.publish(shutdown("filtered")).await.unwrap();

        let event = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type(), "shutdown_requested");
        assert!(filtered.try_recv().unwrap().is_none());
    }
}
