use super::types::{DegradeHint, DetectionBackend, Resolution, ResourceBudget};
use crate::device::{DeviceProfile, DeviceTier};
use crate::host::{HostEnvironmentInfo, HostName, Platform};
use crate::storage::StorageTier;

use tracing::{debug, info};

/// Instagram builds older than this cannot run the pipeline reliably
const INSTAGRAM_MIN_PIPELINE_VERSION: u32 = 200;

/// Unrestricted budget for a device tier
pub fn base_budget(tier: DeviceTier) -> ResourceBudget {
    let (resolution, frame_rate, backend, refine, interval_ms, memory_mb) = match tier {
        DeviceTier::Flagship => (Resolution::new(1280, 720), 30, DetectionBackend::Gpu, true, 125, 500),
        DeviceTier::High => (Resolution::new(960, 540), 30, DetectionBackend::Gpu, true, 150, 300),
        DeviceTier::Mid => (Resolution::new(640, 480), 24, DetectionBackend::Gpu, false, 200, 200),
        DeviceTier::Low => (Resolution::new(480, 360), 15, DetectionBackend::Cpu, false, 300, 100),
        DeviceTier::Unknown => (Resolution::new(640, 480), 24, DetectionBackend::Gpu, false, 250, 150),
    };

    ResourceBudget {
        tier,
        capture_resolution: resolution,
        frame_rate_ceiling: frame_rate,
        detection_backend: backend,
        max_detected_faces: 1,
        refine_landmarks: refine,
        detection_interval_ms: interval_ms,
        memory_ceiling_mb: memory_mb,
        storage_tier_preference: vec![StorageTier::Durable, StorageTier::Session, StorageTier::Memory],
        structured_storage: true,
        detection_enabled: true,
        simplified_ui: false,
        performance_warning: false,
        compatibility_warning: false,
    }
}

/// Restrictions a host imposes. Applying one can only lower a budget.
#[derive(Debug, Clone, Default, PartialEq)]
struct HostCeiling {
    resolution: Option<Resolution>,
    frame_rate: Option<u32>,
    min_interval_ms: Option<u64>,
    memory_mb: Option<u32>,
    force_cpu: bool,
    no_refine: bool,
    drop_durable: bool,
    no_structured_storage: bool,
    disable_detection: bool,
    simplified_ui: bool,
    performance_warning: bool,
    compatibility_warning: bool,
}

impl HostCeiling {
    fn apply(&self, budget: ResourceBudget) -> ResourceBudget {
        let mut storage_tier_preference = budget.storage_tier_preference;
        if self.drop_durable {
            storage_tier_preference.retain(|tier| *tier != StorageTier::Durable);
        }

        ResourceBudget {
            tier: budget.tier,
            capture_resolution: self
                .resolution
                .map_or(budget.capture_resolution, |cap| budget.capture_resolution.capped(cap)),
            frame_rate_ceiling: self
                .frame_rate
                .map_or(budget.frame_rate_ceiling, |cap| budget.frame_rate_ceiling.min(cap)),
            detection_backend: if self.force_cpu {
                DetectionBackend::Cpu
            } else {
                budget.detection_backend
            },
            max_detected_faces: budget.max_detected_faces,
            refine_landmarks: budget.refine_landmarks && !self.no_refine,
            detection_interval_ms: self
                .min_interval_ms
                .map_or(budget.detection_interval_ms, |floor| budget.detection_interval_ms.max(floor)),
            memory_ceiling_mb: self
                .memory_mb
                .map_or(budget.memory_ceiling_mb, |cap| budget.memory_ceiling_mb.min(cap)),
            storage_tier_preference,
            structured_storage: budget.structured_storage && !self.no_structured_storage,
            detection_enabled: budget.detection_enabled && !self.disable_detection,
            simplified_ui: budget.simplified_ui || self.simplified_ui,
            performance_warning: budget.performance_warning || self.performance_warning,
            compatibility_warning: budget.compatibility_warning || self.compatibility_warning,
        }
    }
}

/// Ceilings for a host, most general first
fn host_ceilings(host: &HostEnvironmentInfo) -> Vec<HostCeiling> {
    let mut ceilings = Vec::new();

    if host.is_embedded {
        ceilings.push(HostCeiling {
            resolution: Some(Resolution::new(640, 480)),
            frame_rate: Some(20),
            min_interval_ms: Some(300),
            memory_mb: Some(150),
            no_refine: true,
            compatibility_warning: true,
            ..HostCeiling::default()
        });
    }

    let ios = host.platform == Platform::Ios;
    match host.host {
        Some(HostName::Instagram) => {
            let outdated = host
                .major_version()
                .is_some_and(|major| major < INSTAGRAM_MIN_PIPELINE_VERSION);
            if outdated {
                debug!(version = ?host.version, "Outdated Instagram build, disabling detection");
            }

            ceilings.push(HostCeiling {
                resolution: Some(Resolution::new(480, 360)),
                frame_rate: Some(15),
                min_interval_ms: Some(400),
                memory_mb: Some(if ios { 80 } else { 100 }),
                force_cpu: true,
                drop_durable: host.limitations.durable_storage,
                no_structured_storage: true,
                disable_detection: outdated,
                simplified_ui: true,
                performance_warning: outdated,
                ..HostCeiling::default()
            });
        }
        Some(HostName::Facebook | HostName::Messenger) => {
            ceilings.push(HostCeiling {
                resolution: Some(Resolution::new(640, 480)),
                frame_rate: Some(20),
                memory_mb: Some(120),
                force_cpu: ios,
                no_structured_storage: host.limitations.structured_storage,
                ..HostCeiling::default()
            });
        }
        Some(HostName::TikTok | HostName::Snapchat) => {
            ceilings.push(HostCeiling {
                resolution: Some(Resolution::new(480, 360)),
                frame_rate: Some(15),
                min_interval_ms: Some(500),
                memory_mb: Some(80),
                force_cpu: true,
                simplified_ui: true,
                ..HostCeiling::default()
            });
        }
        Some(HostName::WeChat) => {
            ceilings.push(HostCeiling {
                resolution: Some(Resolution::new(480, 360)),
                frame_rate: Some(15),
                force_cpu: true,
                drop_durable: true,
                no_structured_storage: true,
                disable_detection: true,
                simplified_ui: true,
                performance_warning: true,
                ..HostCeiling::default()
            });
        }
        _ => {}
    }

    let limitations = &host.limitations;
    if limitations.gpu_backend || limitations.durable_storage || limitations.structured_storage {
        ceilings.push(HostCeiling {
            force_cpu: limitations.gpu_backend,
            drop_durable: limitations.durable_storage,
            no_structured_storage: limitations.structured_storage,
            ..HostCeiling::default()
        });
    }

    ceilings
}

/// Compute the resource budget for a device running inside a host.
///
/// The host can only lower the tier's base values. With a degrade hint the
/// base comes from the next cheaper tier instead.
pub fn resolve_budget(
    profile: &DeviceProfile,
    host: &HostEnvironmentInfo,
    degrade: Option<&DegradeHint>,
) -> ResourceBudget {
    let tier = match degrade {
        Some(hint) => {
            let lower = profile.tier.next_lower();
            info!(
                from = %profile.tier,
                to = %lower,
                reason = ?hint.reason,
                fps = hint.observed_fps,
                "Degrading resource budget"
            );
            lower
        }
        None => profile.tier,
    };

    let budget = host_ceilings(host)
        .iter()
        .fold(base_budget(tier), |budget, ceiling| ceiling.apply(budget));

    info!(
        tier = %budget.tier,
        resolution = %budget.capture_resolution,
        fps = budget.frame_rate_ceiling,
        backend = %budget.detection_backend,
        interval_ms = budget.detection_interval_ms,
        memory_mb = budget.memory_ceiling_mb,
        detection_enabled = budget.detection_enabled,
        "Resource budget resolved"
    );

    budget
}
