mod constraints;
mod resolver;
mod types;
#[cfg(test)]
mod tests;

pub use constraints::capture_constraints;
pub use resolver::{base_budget, resolve_budget};
pub use types::{
    CaptureConstraints, DegradeHint, DegradeReason, DetectionBackend, DimensionConstraint,
    FacingMode, Resolution, ResourceBudget,
};
