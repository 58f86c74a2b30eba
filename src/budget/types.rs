use crate::device::DeviceTier;
use crate::storage::StorageTier;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Component-wise minimum
    pub fn capped(self, ceiling: Resolution) -> Self {
        Self {
            width: self.width.min(ceiling.width),
            height: self.height.min(ceiling.height),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Execution backend for the detection pipeline. `Cpu` is the cheaper one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionBackend {
    Gpu,
    Cpu,
}

impl fmt::Display for DetectionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionBackend::Gpu => f.write_str("gpu"),
            DetectionBackend::Cpu => f.write_str("cpu"),
        }
    }
}

/// Resource limits for one detection session. Replaced on re-resolution, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceBudget {
    /// Tier whose base values this budget was derived from
    pub tier: DeviceTier,
    pub capture_resolution: Resolution,
    pub frame_rate_ceiling: u32,
    pub detection_backend: DetectionBackend,
    pub max_detected_faces: u32,
    pub refine_landmarks: bool,
    pub detection_interval_ms: u64,
    pub memory_ceiling_mb: u32,
    pub storage_tier_preference: Vec<StorageTier>,
    pub structured_storage: bool,
    pub detection_enabled: bool,
    pub simplified_ui: bool,
    pub performance_warning: bool,
    pub compatibility_warning: bool,
}

impl ResourceBudget {
    /// Same budget with the compatibility warning raised
    pub fn with_compatibility_warning(self) -> Self {
        Self {
            compatibility_warning: true,
            ..self
        }
    }

    /// Whether every limit of `self` is at or below the matching limit of `other`
    pub fn within(&self, other: &ResourceBudget) -> bool {
        let backend_ok = self.detection_backend == DetectionBackend::Cpu
            || other.detection_backend == DetectionBackend::Gpu;

        self.capture_resolution.width <= other.capture_resolution.width
            && self.capture_resolution.height <= other.capture_resolution.height
            && self.frame_rate_ceiling <= other.frame_rate_ceiling
            && self.max_detected_faces <= other.max_detected_faces
            && (!self.refine_landmarks || other.refine_landmarks)
            && self.detection_interval_ms >= other.detection_interval_ms
            && self.memory_ceiling_mb <= other.memory_ceiling_mb
            && (!self.detection_enabled || other.detection_enabled)
            && backend_ok
    }
}

/// Why a running session asked for a cheaper budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    LowFrameRate,
    MemoryPressure,
}

/// Observation that the current budget is too expensive for this device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradeHint {
    pub reason: DegradeReason,
    pub observed_fps: f64,
    pub mean_memory_mb: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

impl FacingMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" | "front" => Some(FacingMode::User),
            "environment" | "back" | "rear" => Some(FacingMode::Environment),
            _ => None,
        }
    }
}

/// One dimension of a capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionConstraint {
    Ideal(u32),
    Exact(u32),
}

impl DimensionConstraint {
    pub fn value(self) -> u32 {
        match self {
            DimensionConstraint::Ideal(v) | DimensionConstraint::Exact(v) => v,
        }
    }
}

/// Request handed to the video source when opening the camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub facing_mode: FacingMode,
    pub width: DimensionConstraint,
    pub height: DimensionConstraint,
    pub frame_rate_max: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio_ideal: Option<f64>,
}
