use super::types::{Assessment, ComponentState, ShutdownReason};
use crate::budget::ResourceBudget;
use crate::config::AdaptcamConfig;
use crate::detection::{DetectionLoop, LoopState, MemoryProbe, OverlayRenderer, SharedPipeline, VideoSource};
use crate::device::DeviceTier;
use crate::error::{AdaptcamError, Result};
use crate::events::{EventBus, EventFilter, EventReceiver};
use crate::signals::SignalSource;
use crate::storage::{
    FragmentState, KeyValueStore, NavigationState, SessionRecovery, StorageRedundancyManager,
    StorageTier,
};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

/// The camera-side pieces the detection loop runs against
#[derive(Clone)]
pub struct DetectionCollaborators {
    pub pipeline: SharedPipeline,
    pub video: Arc<dyn VideoSource>,
    pub renderer: Arc<dyn OverlayRenderer>,
    pub memory_probe: Option<Arc<dyn MemoryProbe>>,
}

/// Wires classification, budget resolution, the storage chain and the detection loop
pub struct AdaptiveRuntime {
    pub(super) config: AdaptcamConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) signal_source: Arc<dyn SignalSource>,
    pub(super) navigation: Arc<dyn NavigationState>,
    pub(super) store_overrides: HashMap<StorageTier, Arc<dyn KeyValueStore>>,
    pub(super) collaborators: Option<DetectionCollaborators>,
    pub(super) tier_override: Option<DeviceTier>,

    // Derived at initialize()
    pub(super) assessment: Option<Assessment>,
    pub(super) budget: Option<ResourceBudget>,
    pub(super) storage: Option<Arc<StorageRedundancyManager>>,
    pub(super) recovery: Option<SessionRecovery>,
    pub(super) session_token: Option<String>,
    pub(super) detection: Option<Arc<DetectionLoop>>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    /// Subscribed at build time so reports from a loop started before run() are kept
    pub(super) degrade_events: Option<EventReceiver>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl AdaptiveRuntime {
    pub fn builder() -> AdaptiveRuntimeBuilder {
        AdaptiveRuntimeBuilder::new()
    }

    pub fn config(&self) -> &AdaptcamConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn assessment(&self) -> Option<&Assessment> {
        self.assessment.as_ref()
    }

    /// Budget currently in force; replaced on degrade
    pub fn budget(&self) -> Option<&ResourceBudget> {
        self.budget.as_ref()
    }

    pub fn storage(&self) -> Option<Arc<StorageRedundancyManager>> {
        self.storage.clone()
    }

    pub fn recovery(&self) -> Option<&SessionRecovery> {
        self.recovery.as_ref()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn detection_state(&self) -> Option<LoopState> {
        self.detection.as_ref().map(|detection| detection.state())
    }

    pub fn detection(&self) -> Option<Arc<DetectionLoop>> {
        self.detection.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub(super) fn require_assessment(&self) -> Result<&Assessment> {
        self.assessment
            .as_ref()
            .ok_or_else(|| AdaptcamError::system("Runtime has not been initialized"))
    }
}

/// Builder for [`AdaptiveRuntime`]
#[derive(Default)]
pub struct AdaptiveRuntimeBuilder {
    config: Option<AdaptcamConfig>,
    event_bus: Option<Arc<EventBus>>,
    signal_source: Option<Arc<dyn SignalSource>>,
    navigation: Option<Arc<dyn NavigationState>>,
    store_overrides: HashMap<StorageTier, Arc<dyn KeyValueStore>>,
    collaborators: Option<DetectionCollaborators>,
    tier_override: Option<DeviceTier>,
}

impl AdaptiveRuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: AdaptcamConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn signals(mut self, source: Arc<dyn SignalSource>) -> Self {
        self.signal_source = Some(source);
        self
    }

    pub fn navigation(mut self, navigation: Arc<dyn NavigationState>) -> Self {
        self.navigation = Some(navigation);
        self
    }

    /// Use `store` for `tier` instead of the default one
    pub fn store(mut self, tier: StorageTier, store: Arc<dyn KeyValueStore>) -> Self {
        self.store_overrides.insert(tier, store);
        self
    }

    pub fn detection(mut self, collaborators: DetectionCollaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    pub fn tier_override(mut self, tier: Option<DeviceTier>) -> Self {
        self.tier_override = tier;
        self
    }

    pub fn build(self) -> Result<AdaptiveRuntime> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let signal_source = self
            .signal_source
            .ok_or_else(|| AdaptcamError::component("runtime", "Signal source is required"))?;

        let event_bus = self.event_bus.unwrap_or_else(|| {
            Arc::new(if config.system.debug_events {
                EventBus::with_debug_logging(config.system.event_bus_capacity)
            } else {
                EventBus::new(config.system.event_bus_capacity)
            })
        });

        let navigation = self
            .navigation
            .unwrap_or_else(|| Arc::new(FragmentState::default()));

        let degrade_events = event_bus
            .subscribe_filtered(EventFilter::EventTypes(vec!["degrade_detected"]), "runtime");
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(AdaptiveRuntime {
            config,
            event_bus,
            signal_source,
            navigation,
            store_overrides: self.store_overrides,
            collaborators: self.collaborators,
            tier_override: self.tier_override,
            assessment: None,
            budget: None,
            storage: None,
            recovery: None,
            session_token: None,
            detection: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            degrade_events: Some(degrade_events),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }
}
