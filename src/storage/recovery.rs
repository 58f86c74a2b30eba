use super::manager::StorageRedundancyManager;
use super::StorageTier;
use crate::config::StorageConfig;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SESSION_PARAM: &str = "session";

/// The page's navigation fragment, which survives reloads that wipe storage
pub trait NavigationState: Send + Sync {
    /// Current fragment without the leading `#`
    fn fragment(&self) -> String;

    /// Replace the fragment without adding a history entry
    fn replace_fragment(&self, fragment: &str);
}

/// In-process navigation fragment
#[derive(Debug, Default)]
pub struct FragmentState {
    fragment: Mutex<String>,
}

impl FragmentState {
    pub fn new<S: Into<String>>(fragment: S) -> Self {
        let fragment = fragment.into();
        Self {
            fragment: Mutex::new(fragment.trim_start_matches('#').to_string()),
        }
    }
}

impl NavigationState for FragmentState {
    fn fragment(&self) -> String {
        self.fragment.lock().clone()
    }

    fn replace_fragment(&self, fragment: &str) {
        *self.fragment.lock() = fragment.trim_start_matches('#').to_string();
    }
}

/// Token carried in a `session=<token>` fragment parameter
pub fn session_from_fragment(fragment: &str) -> Option<&str> {
    fragment
        .trim_start_matches('#')
        .split('&')
        .find_map(|pair| pair.strip_prefix("session="))
        .filter(|token| !token.is_empty())
}

/// `fragment` with its session parameter replaced, added or (for `None`) dropped
pub fn fragment_with_session(fragment: &str, token: Option<&str>) -> String {
    let mut params: Vec<String> = fragment
        .trim_start_matches('#')
        .split('&')
        .filter(|pair| !pair.is_empty() && !pair.starts_with("session="))
        .map(str::to_string)
        .collect();

    if let Some(token) = token {
        params.insert(0, format!("{}={}", SESSION_PARAM, token));
    }

    params.join("&")
}

/// Where a recovered token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    Navigation,
    Session,
    Durable,
    Memory,
    Standing,
}

impl From<StorageTier> for TokenSource {
    fn from(tier: StorageTier) -> Self {
        match tier {
            StorageTier::Durable => TokenSource::Durable,
            StorageTier::Session => TokenSource::Session,
            StorageTier::Memory => TokenSource::Memory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveredToken {
    pub token: String,
    pub source: TokenSource,
    /// False when another replica holds a different token
    pub consistent: bool,
}

/// Replicates the session recovery token across every tier and the navigation fragment
pub struct SessionRecovery {
    storage: Arc<StorageRedundancyManager>,
    navigation: Arc<dyn NavigationState>,
    config: StorageConfig,
}

impl SessionRecovery {
    pub fn new(
        storage: Arc<StorageRedundancyManager>,
        navigation: Arc<dyn NavigationState>,
        config: StorageConfig,
    ) -> Self {
        Self {
            storage,
            navigation,
            config,
        }
    }

    /// Save `token` everywhere. Returns the storage tiers that accepted it.
    pub async fn save_token(&self, token: &str) -> Vec<StorageTier> {
        let written = self.storage.replicate(&self.config.session_key, token).await;

        let timestamp = Utc::now().timestamp_millis().to_string();
        self.storage
            .replicate(&self.config.session_timestamp_key, &timestamp)
            .await;

        let fragment = self.navigation.fragment();
        if session_from_fragment(&fragment) != Some(token) {
            self.navigation
                .replace_fragment(&fragment_with_session(&fragment, Some(token)));
        }

        info!(token, tiers = ?written, "Session token backed up");
        written
    }

    /// Recover the token from the first replica that has it.
    ///
    /// Order: navigation fragment, session, durable, memory, standing map. A token
    /// whose stored timestamp is outside the validity window is cleared instead.
    pub async fn recover_token(&self) -> Option<RecoveredToken> {
        let mut replicas: Vec<(TokenSource, String)> = Vec::new();

        if let Some(token) = session_from_fragment(&self.navigation.fragment()) {
            replicas.push((TokenSource::Navigation, token.to_string()));
        }

        for tier in [StorageTier::Session, StorageTier::Durable, StorageTier::Memory] {
            if let Some(token) = self.storage.get_from(tier, &self.config.session_key).await {
                replicas.push((tier.into(), token));
            }
        }

        if let Some(token) = self.storage.get_standing(&self.config.session_key) {
            replicas.push((TokenSource::Standing, token));
        }

        let (source, token) = replicas.first().cloned()?;

        if self.is_expired().await {
            info!("Stored session token expired, clearing");
            self.clear_token().await;
            return None;
        }

        let consistent = replicas.iter().all(|(_, other)| *other == token);
        if !consistent {
            let divergent: Vec<TokenSource> = replicas
                .iter()
                .filter(|(_, other)| *other != token)
                .map(|(source, _)| *source)
                .collect();
            warn!(?source, ?divergent, "Session token replicas diverge");
        } else {
            debug!(?source, replicas = replicas.len(), "Session token recovered");
        }

        Some(RecoveredToken {
            token,
            source,
            consistent,
        })
    }

    /// Remove the token and its timestamp from every tier and the fragment
    pub async fn clear_token(&self) {
        self.storage.remove(&self.config.session_key).await;
        self.storage.remove(&self.config.session_timestamp_key).await;

        let fragment = self.navigation.fragment();
        if session_from_fragment(&fragment).is_some() {
            self.navigation
                .replace_fragment(&fragment_with_session(&fragment, None));
        }

        debug!("Session token cleared");
    }

    /// A missing or unreadable timestamp counts as fresh
    async fn is_expired(&self) -> bool {
        let Some(raw) = self.storage.get(&self.config.session_timestamp_key).await else {
            return false;
        };
        let Ok(saved_ms) = raw.parse::<i64>() else {
            warn!("Ignoring malformed session timestamp '{}'", raw);
            return false;
        };

        let max_age_ms = i64::from(self.config.session_validity_hours) * 60 * 60 * 1000;
        Utc::now().timestamp_millis() - saved_ms > max_age_ms
    }
}
