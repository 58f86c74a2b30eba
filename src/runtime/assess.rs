use super::types::Assessment;
use crate::budget::{resolve_budget, DegradeHint, ResourceBudget};
use crate::config::AdaptcamConfig;
use crate::device::{
    capability_check, classify_device, CapabilityConcern, DeviceProfile, DeviceTier, ProfileSource,
};
use crate::error::Result;
use crate::host::{advisory_message, camera_permission_workaround, classify_host, HostEnvironmentInfo};
use crate::signals::CapabilitySignals;
use crate::storage::{
    FileStore, KeyValueStore, MemoryStore, StorageRedundancyManager, StorageTier, UnavailableStore,
};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Classify the device and host behind `signals` and resolve their budget.
///
/// `tier_override` replaces the classified tier but keeps the rest of the profile.
pub fn assess(
    config: &AdaptcamConfig,
    signals: CapabilitySignals,
    tier_override: Option<DeviceTier>,
) -> Assessment {
    let mut profile = classify_device(&signals, &config.classifier);
    if let Some(tier) = tier_override {
        info!(from = %profile.tier, to = %tier, "Device tier overridden");
        profile = DeviceProfile {
            tier,
            source: ProfileSource::Override,
            ..profile
        };
    }

    let host = classify_host(&signals.user_agent);
    let concerns = capability_check(&profile, &signals);
    let budget = budget_for(&profile, &host, &concerns, None);

    let advisory = advisory_message(&host);
    if let Some(message) = &advisory {
        warn!("{}", message);
    }
    let camera_workaround = camera_permission_workaround(&host, &signals.user_agent);

    Assessment {
        signals,
        profile,
        host,
        budget,
        concerns,
        advisory,
        camera_workaround,
    }
}

fn budget_for(
    profile: &DeviceProfile,
    host: &HostEnvironmentInfo,
    concerns: &[CapabilityConcern],
    degrade: Option<&DegradeHint>,
) -> ResourceBudget {
    let budget = resolve_budget(profile, host, degrade);
    if concerns.is_empty() {
        budget
    } else {
        budget.with_compatibility_warning()
    }
}

impl Assessment {
    /// The budget one step cheaper than `current`. Equal to `current` once the floor is reached.
    pub fn degraded_budget(&self, current: &ResourceBudget, hint: &DegradeHint) -> ResourceBudget {
        let effective = DeviceProfile {
            tier: current.tier,
            ..self.profile.clone()
        };
        budget_for(&effective, &self.host, &self.concerns, Some(hint))
    }
}

/// Storage chain for a resolved budget. Tiers the host cannot persist get an
/// unavailable store; `overrides` replace the default store of a tier.
pub fn storage_chain(
    config: &AdaptcamConfig,
    budget: &ResourceBudget,
    host: &HostEnvironmentInfo,
    overrides: &HashMap<StorageTier, Arc<dyn KeyValueStore>>,
) -> Result<StorageRedundancyManager> {
    let durable: Arc<dyn KeyValueStore> = if host.limitations.durable_storage {
        Arc::new(UnavailableStore::new("durable"))
    } else {
        Arc::new(FileStore::new(&config.storage.durable_path))
    };

    let mut builder = StorageRedundancyManager::builder()
        .tier(StorageTier::Durable, durable)
        .tier(StorageTier::Session, Arc::new(MemoryStore::new("session")))
        .tier(StorageTier::Memory, Arc::new(MemoryStore::new("memory")));

    for (tier, store) in overrides {
        builder = builder.tier(*tier, Arc::clone(store));
    }

    builder
        .preference(budget.storage_tier_preference.clone())
        .build()
}
