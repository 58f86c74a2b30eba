mod classifier;
mod profile;
mod tables;

pub use classifier::{capability_check, classify_device, DeviceClassifier};
pub use profile::{CapabilityConcern, DeviceProfile, DeviceTier, ProfileSource};
