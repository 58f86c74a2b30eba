use super::store::{KeyValueStore, MemoryStore};
use super::StorageTier;
use crate::error::{AdaptcamError, Result, StorageError};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a write through the tier chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub key: String,
    pub value: String,
    /// First tier that accepted the write; `None` when only the standing map holds it
    pub tier_written: Option<StorageTier>,
}

/// Writes values through an ordered chain of storage tiers.
///
/// Every write also lands in a standing in-memory map that cannot fail, so a
/// value written in this process stays readable even when every tier rejects it.
pub struct StorageRedundancyManager {
    stores: HashMap<StorageTier, Arc<dyn KeyValueStore>>,
    preference: Vec<StorageTier>,
    standing: MemoryStore,
}

impl StorageRedundancyManager {
    pub fn builder() -> StorageRedundancyManagerBuilder {
        StorageRedundancyManagerBuilder::new()
    }

    pub fn preference(&self) -> &[StorageTier] {
        &self.preference
    }

    pub fn store(&self, tier: StorageTier) -> Option<&Arc<dyn KeyValueStore>> {
        self.stores.get(&tier)
    }

    fn chain(&self) -> impl Iterator<Item = (StorageTier, &Arc<dyn KeyValueStore>)> {
        self.preference
            .iter()
            .filter_map(|tier| self.stores.get(tier).map(|store| (*tier, store)))
    }

    /// Write `value` to the first tier that accepts it. Never fails.
    pub async fn set(&self, key: &str, value: &str) -> StorageRecord {
        let mut tier_written = None;
        let mut rejected = Vec::new();

        for (tier, store) in self.chain() {
            match store.set(key, value).await {
                Ok(()) => {
                    tier_written = Some(tier);
                    break;
                }
                Err(e) => {
                    warn!("Storage tier {} rejected '{}', falling back: {}", tier, key, e);
                    rejected.push(tier);
                }
            }
        }

        self.standing.write(key, value);

        // A rejecting tier may still hold an older value that get() would see first
        if tier_written.is_some() {
            for tier in rejected {
                if let Some(store) = self.stores.get(&tier) {
                    if let Err(e) = store.remove(key).await {
                        debug!("Could not invalidate '{}' on tier {}: {}", key, tier, e);
                    }
                }
            }
        }

        match tier_written {
            Some(tier) => debug!("Stored '{}' on tier {}", key, tier),
            None => warn!("All storage tiers rejected '{}', keeping in-memory fallback", key),
        }

        StorageRecord {
            key: key.to_string(),
            value: value.to_string(),
            tier_written,
        }
    }

    /// Like [`set`](Self::set) but fails when no tier in the chain accepted the write
    pub async fn set_required(&self, key: &str, value: &str) -> Result<StorageRecord> {
        let record = self.set(key, value).await;
        if record.tier_written.is_none() {
            return Err(AdaptcamError::Storage(StorageError::Exhausted {
                key: key.to_string(),
            }));
        }
        Ok(record)
    }

    /// Write `value` to every registered tier. Returns the tiers that accepted.
    pub async fn replicate(&self, key: &str, value: &str) -> Vec<StorageTier> {
        let mut written = Vec::new();

        for tier in StorageTier::ALL {
            let Some(store) = self.stores.get(&tier) else {
                continue;
            };
            match store.set(key, value).await {
                Ok(()) => written.push(tier),
                Err(e) => warn!("Failed to replicate '{}' to tier {}: {}", key, tier, e),
            }
        }

        self.standing.write(key, value);
        written
    }

    /// First value found in preference order, then the standing map.
    /// Tier failures count as misses.
    pub async fn get(&self, key: &str) -> Option<String> {
        for (tier, store) in self.chain() {
            match store.get(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => debug!("Storage tier {} failed reading '{}': {}", tier, key, e),
            }
        }

        self.standing.read(key)
    }

    /// Value held by one specific tier, ignoring preference
    pub async fn get_from(&self, tier: StorageTier, key: &str) -> Option<String> {
        let store = self.stores.get(&tier)?;
        match store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                debug!("Storage tier {} failed reading '{}': {}", tier, key, e);
                None
            }
        }
    }

    pub fn get_standing(&self, key: &str) -> Option<String> {
        self.standing.read(key)
    }

    /// Remove `key` from every registered tier and the standing map. Best effort.
    pub async fn remove(&self, key: &str) {
        for (tier, store) in &self.stores {
            if let Err(e) = store.remove(key).await {
                warn!("Failed to remove '{}' from tier {}: {}", key, tier, e);
            }
        }
        self.standing.delete(key);
    }
}

/// Builder for [`StorageRedundancyManager`]
#[derive(Default)]
pub struct StorageRedundancyManagerBuilder {
    stores: HashMap<StorageTier, Arc<dyn KeyValueStore>>,
    preference: Option<Vec<StorageTier>>,
}

impl StorageRedundancyManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tier(mut self, tier: StorageTier, store: Arc<dyn KeyValueStore>) -> Self {
        self.stores.insert(tier, store);
        self
    }

    pub fn preference(mut self, preference: Vec<StorageTier>) -> Self {
        self.preference = Some(preference);
        self
    }

    pub fn build(self) -> Result<StorageRedundancyManager> {
        let preference = self
            .preference
            .ok_or_else(|| AdaptcamError::component("storage", "Tier preference is required"))?;

        if let Some(missing) = preference.iter().find(|tier| !self.stores.contains_key(tier)) {
            return Err(AdaptcamError::component(
                "storage".to_string(),
                format!("No store registered for tier {}", missing),
            ));
        }

        let mut seen = Vec::with_capacity(preference.len());
        for tier in preference {
            if !seen.contains(&tier) {
                seen.push(tier);
            }
        }

        Ok(StorageRedundancyManager {
            stores: self.stores,
            preference: seen,
            standing: MemoryStore::new("standing"),
        })
    }
}
