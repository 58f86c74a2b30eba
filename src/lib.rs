pub mod budget;
pub mod config;
pub mod detection;
pub mod device;
pub mod error;
pub mod events;
pub mod host;
pub mod runtime;
pub mod signals;
pub mod storage;

pub use budget::{
    capture_constraints, resolve_budget, CaptureConstraints, DegradeHint, DegradeReason,
    DetectionBackend, FacingMode, Resolution, ResourceBudget,
};
pub use config::AdaptcamConfig;
pub use detection::{
    DetectionLoop, DetectionPipeline, DrawingPayload, LoopState, OverlayRenderer,
    PerformanceWindow, SharedPipeline, VideoSource,
};
pub use device::{classify_device, DeviceProfile, DeviceTier};
pub use error::{AdaptcamError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, RuntimeEvent};
pub use host::{classify_host, HostEnvironmentInfo, HostName, Platform};
pub use runtime::{AdaptiveRuntime, Assessment, ComponentState, ShutdownReason};
pub use signals::{CapabilitySignals, SignalSource, StaticSignals};
pub use storage::{SessionRecovery, StorageRedundancyManager, StorageTier};
