use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete performance class used to pick a base resource budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTier {
    Flagship,
    High,
    Mid,
    Low,
    Unknown,
}

impl DeviceTier {
    pub const ALL: [DeviceTier; 5] = [
        DeviceTier::Flagship,
        DeviceTier::High,
        DeviceTier::Mid,
        DeviceTier::Low,
        DeviceTier::Unknown,
    ];

    /// The next cheaper predefined tier. `Low` is the floor.
    pub fn next_lower(self) -> Self {
        match self {
            DeviceTier::Flagship => DeviceTier::High,
            DeviceTier::High => DeviceTier::Mid,
            DeviceTier::Mid => DeviceTier::Low,
            DeviceTier::Low => DeviceTier::Low,
            DeviceTier::Unknown => DeviceTier::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceTier::Flagship => "flagship",
            DeviceTier::High => "high",
            DeviceTier::Mid => "mid",
            DeviceTier::Low => "low",
            DeviceTier::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "flagship" => Some(DeviceTier::Flagship),
            "high" => Some(DeviceTier::High),
            "mid" => Some(DeviceTier::Mid),
            "low" => Some(DeviceTier::Low),
            "unknown" => Some(DeviceTier::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the profile was identified, for field debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    HardwareIdentifier,
    ScreenFingerprint,
    ModelPattern,
    PlatformVersion,
    Desktop,
    Heuristic,
    Override,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub model: String,
    pub tier: DeviceTier,
    /// Installed memory in GB, 0 when unknown
    pub ram_gb: u32,
    pub chipset: Option<String>,
    pub gpu: Option<String>,
    pub year: Option<u16>,
    pub source: ProfileSource,
}

impl DeviceProfile {
    /// Profile for a tier forced from outside the classifier
    pub fn with_tier(tier: DeviceTier) -> Self {
        Self {
            model: "unknown".to_string(),
            tier,
            ram_gb: 0,
            chipset: None,
            gpu: None,
            year: None,
            source: ProfileSource::Override,
        }
    }
}

/// Reasons a device may struggle to run the detection pipeline at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityConcern {
    InsufficientMemory { ram_gb: u32 },
    NoGpuRenderer,
}

impl fmt::Display for CapabilityConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityConcern::InsufficientMemory { ram_gb } => {
                write!(f, "low-tier device with {}GB memory", ram_gb)
            }
            CapabilityConcern::NoGpuRenderer => f.write_str("no GPU renderer detected"),
        }
    }
}
