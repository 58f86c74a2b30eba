//! Redundant key-value storage across durable, session and memory tiers.

mod manager;
mod recovery;
mod store;

pub use manager::{StorageRecord, StorageRedundancyManager, StorageRedundancyManagerBuilder};
pub use recovery::{
    fragment_with_session, session_from_fragment, FragmentState, NavigationState,
    RecoveredToken, SessionRecovery, TokenSource,
};
pub use store::{FileStore, KeyValueStore, MemoryStore, UnavailableStore};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persistence class of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    /// Survives restarts
    Durable,
    /// Lives as long as the browsing session
    Session,
    /// Lives as long as the process
    Memory,
}

impl StorageTier {
    pub const ALL: [StorageTier; 3] = [StorageTier::Durable, StorageTier::Session, StorageTier::Memory];
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageTier::Durable => f.write_str("durable"),
            StorageTier::Session => f.write_str("session"),
            StorageTier::Memory => f.write_str("memory"),
        }
    }
}
