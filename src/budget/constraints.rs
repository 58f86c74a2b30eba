use super::types::{CaptureConstraints, DimensionConstraint, FacingMode, ResourceBudget};
use crate::host::{HostEnvironmentInfo, HostName, Platform};

use tracing::debug;

const ANDROID_ASPECT_RATIO: f64 = 16.0 / 9.0;

/// Camera request for a budget on the given host
pub fn capture_constraints(
    budget: &ResourceBudget,
    host: &HostEnvironmentInfo,
    facing_mode: FacingMode,
) -> CaptureConstraints {
    let resolution = budget.capture_resolution;

    // iOS honours exact dimensions better than ideal ones
    let (width, height) = match host.platform {
        Platform::Ios => (
            DimensionConstraint::Exact(resolution.width),
            DimensionConstraint::Exact(resolution.height),
        ),
        _ => (
            DimensionConstraint::Ideal(resolution.width),
            DimensionConstraint::Ideal(resolution.height),
        ),
    };

    let aspect_ratio_ideal = (host.platform == Platform::Android
        && !host.is_host(HostName::Instagram))
    .then_some(ANDROID_ASPECT_RATIO);

    let constraints = CaptureConstraints {
        facing_mode,
        width,
        height,
        frame_rate_max: budget.frame_rate_ceiling,
        aspect_ratio_ideal,
    };

    debug!(?constraints, "Capture constraints");

    constraints
}
