//! Raw capability signals read from the execution environment.
//!
//! Every field is optional: a platform that does not expose a signal leaves it
//! `None`, and consumers treat that as the most conservative value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network class hint as reported by the host (`effectiveType`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkClass {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
    Other(String),
}

impl NetworkClass {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "slow-2g" => Self::Slow2g,
            "2g" => Self::TwoG,
            "3g" => Self::ThreeG,
            "4g" => Self::FourG,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Slow2g => "slow-2g",
            Self::TwoG => "2g",
            Self::ThreeG => "3g",
            Self::FourG => "4g",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Screen geometry in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f64,
}

/// Snapshot of everything the classifiers may look at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitySignals {
    /// Logical processor count (`hardwareConcurrency`)
    pub cores: Option<u32>,
    /// Device memory hint in GB (`deviceMemory`)
    pub memory_gb: Option<f64>,
    pub network: Option<NetworkClass>,
    /// Unmasked GPU renderer string
    pub gpu_renderer: Option<String>,
    pub max_texture_size: Option<u32>,
    pub screen: Option<ScreenGeometry>,
    pub user_agent: String,
}

impl CapabilitySignals {
    /// Signals carrying only a user agent
    pub fn from_user_agent<S: Into<String>>(user_agent: S) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..Self::default()
        }
    }

    pub fn with_cores(mut self, cores: u32) -> Self {
        self.cores = Some(cores);
        self
    }

    pub fn with_memory_gb(mut self, memory_gb: f64) -> Self {
        self.memory_gb = Some(memory_gb);
        self
    }

    pub fn with_network(mut self, network: NetworkClass) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_gpu_renderer<S: Into<String>>(mut self, renderer: S) -> Self {
        self.gpu_renderer = Some(renderer.into());
        self
    }

    pub fn with_max_texture_size(mut self, size: u32) -> Self {
        self.max_texture_size = Some(size);
        self
    }

    pub fn with_screen(mut self, width: u32, height: u32, pixel_ratio: f64) -> Self {
        self.screen = Some(ScreenGeometry {
            width,
            height,
            pixel_ratio,
        });
        self
    }
}

/// Reader for the raw environment signals. Implementations must not apply policy.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn read(&self) -> CapabilitySignals;
}

/// Signal source backed by a fixed snapshot (CLI input, tests, server-side rendering)
#[derive(Debug, Clone, Default)]
pub struct StaticSignals {
    signals: CapabilitySignals,
}

impl StaticSignals {
    pub fn new(signals: CapabilitySignals) -> Self {
        Self { signals }
    }
}

#[async_trait]
impl SignalSource for StaticSignals {
    async fn read(&self) -> CapabilitySignals {
        self.signals.clone()
    }
}
