mod classifier;
mod types;

pub use classifier::{advisory_message, camera_permission_workaround, classify_host};
pub use types::{HostDeviceHint, HostEnvironmentInfo, HostLimitations, HostName, Platform};
