use crate::budget::{capture_constraints, CaptureConstraints, FacingMode, ResourceBudget};
use crate::device::{CapabilityConcern, DeviceProfile};
use crate::host::HostEnvironmentInfo;
use crate::signals::CapabilitySignals;

use serde::Serialize;

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Runtime shutdown reason
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

/// Everything derived from one read of the capability signals
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub signals: CapabilitySignals,
    pub profile: DeviceProfile,
    pub host: HostEnvironmentInfo,
    pub budget: ResourceBudget,
    pub concerns: Vec<CapabilityConcern>,
    pub advisory: Option<String>,
    pub camera_workaround: bool,
}

impl Assessment {
    pub fn constraints(&self, facing_mode: FacingMode) -> CaptureConstraints {
        capture_constraints(&self.budget, &self.host, facing_mode)
    }
}
