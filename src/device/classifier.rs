use super::profile::{CapabilityConcern, DeviceProfile, DeviceTier, ProfileSource};
use super::tables;
use crate::config::ClassifierConfig;
use crate::signals::CapabilitySignals;

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static IOS_DEVICE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"iPhone|iPad|iPod").unwrap());
static ANDROID_DEVICE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Android").unwrap());
static DESKTOP_PLATFORM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Windows NT|Macintosh|X11|CrOS").unwrap());
static IPHONE_HARDWARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"iPhone(\d+),(\d+)").unwrap());
static IOS_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"OS (\d+)[_.]\d+").unwrap());
static ANDROID_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Android\s+(\d+)").unwrap());
static ANDROID_MODEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Android[^;)]*;\s*([^;)]+)").unwrap());

/// Device classifier with its GPU pattern lists compiled once
#[derive(Debug, Clone)]
pub struct DeviceClassifier {
    config: ClassifierConfig,
    gpu_top: Vec<Regex>,
    gpu_high: Vec<Regex>,
    gpu_mid: Vec<Regex>,
}

impl DeviceClassifier {
    /// Build a classifier. Patterns that fail to compile are skipped so that
    /// classification stays total even with a bad configuration.
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            gpu_top: compile_patterns(&config.gpu_top_patterns),
            gpu_high: compile_patterns(&config.gpu_high_patterns),
            gpu_mid: compile_patterns(&config.gpu_mid_patterns),
            config: config.clone(),
        }
    }

    pub fn classify(&self, signals: &CapabilitySignals) -> DeviceProfile {
        let ua = signals.user_agent.as_str();

        let profile = if IOS_DEVICE.is_match(ua) {
            self.identify_ios(signals)
        } else if ANDROID_DEVICE.is_match(ua) {
            self.identify_android(signals)
        } else if DESKTOP_PLATFORM.is_match(ua) {
            DeviceProfile {
                model: "Desktop".to_string(),
                tier: DeviceTier::Flagship,
                ram_gb: 8,
                chipset: None,
                gpu: signals.gpu_renderer.clone(),
                year: None,
                source: ProfileSource::Desktop,
            }
        } else {
            self.estimate(signals, "unknown")
        };

        info!(
            model = %profile.model,
            tier = %profile.tier,
            ram_gb = profile.ram_gb,
            source = ?profile.source,
            "Device classified"
        );

        profile
    }

    fn identify_ios(&self, signals: &CapabilitySignals) -> DeviceProfile {
        let ua = signals.user_agent.as_str();

        let by_hardware = IPHONE_HARDWARE_ID.captures(ua).and_then(|caps| {
            let identifier = format!("{},{}", &caps[1], &caps[2]);
            debug!("iPhone hardware identifier {}", identifier);
            tables::iphone_for_hardware_id(&identifier)
        });

        let identified = by_hardware
            .map(|name| (name, ProfileSource::HardwareIdentifier))
            .or_else(|| {
                signals
                    .screen
                    .as_ref()
                    .and_then(tables::iphone_for_screen)
                    .map(|name| (name, ProfileSource::ScreenFingerprint))
            });

        if let Some((name, source)) = identified {
            if let Some(known) = tables::iphone_model(name) {
                return DeviceProfile {
                    model: known.name.to_string(),
                    tier: known.tier,
                    ram_gb: known.ram_gb,
                    chipset: known.chipset.map(str::to_string),
                    gpu: signals.gpu_renderer.clone(),
                    year: known.year,
                    source,
                };
            }
        }

        match major_version(&IOS_VERSION, ua) {
            Some(major) => {
                let (tier, ram_gb) = match major {
                    16.. => (DeviceTier::High, 4),
                    14..=15 => (DeviceTier::Mid, 3),
                    _ => (DeviceTier::Low, 2),
                };
                debug!("Unidentified iOS device, falling back to iOS {}", major);
                DeviceProfile {
                    model: format!("iOS device (iOS {})", major),
                    tier,
                    ram_gb,
                    chipset: None,
                    gpu: signals.gpu_renderer.clone(),
                    year: None,
                    source: ProfileSource::PlatformVersion,
                }
            }
            None => self.estimate(signals, "iOS device"),
        }
    }

    fn identify_android(&self, signals: &CapabilitySignals) -> DeviceProfile {
        let ua = signals.user_agent.as_str();
        let model_token = extract_android_model(ua);

        let family = tables::android_family(ua).or_else(|| {
            model_token
                .as_deref()
                .and_then(tables::android_family)
        });

        let model = model_token.unwrap_or_else(|| "Android device".to_string());

        if let Some(family) = family {
            return DeviceProfile {
                model,
                tier: family.tier,
                ram_gb: family.ram_gb,
                chipset: family.chipset.map(str::to_string),
                gpu: signals.gpu_renderer.clone(),
                year: None,
                source: ProfileSource::ModelPattern,
            };
        }

        match major_version(&ANDROID_VERSION, ua) {
            Some(major) => {
                let (tier, ram_gb) = match major {
                    13.. => (DeviceTier::High, 6),
                    11..=12 => (DeviceTier::Mid, 4),
                    9..=10 => (DeviceTier::Mid, 3),
                    _ => (DeviceTier::Low, 2),
                };
                debug!("Unidentified Android model, falling back to Android {}", major);
                DeviceProfile {
                    model,
                    tier,
                    ram_gb,
                    chipset: None,
                    gpu: signals.gpu_renderer.clone(),
                    year: None,
                    source: ProfileSource::PlatformVersion,
                }
            }
            None => self.estimate(signals, &model),
        }
    }

    fn estimate(&self, signals: &CapabilitySignals, model: &str) -> DeviceProfile {
        let score = self.heuristic_score(signals);
        let tier = self.tier_for_score(score);
        let ram_gb = signals
            .memory_gb
            .filter(|gb| gb.is_finite() && *gb > 0.0)
            .map_or(0, |gb| gb.floor() as u32);

        debug!(score, %tier, "Heuristic device estimate");

        DeviceProfile {
            model: model.to_string(),
            tier,
            ram_gb,
            chipset: None,
            gpu: signals.gpu_renderer.clone(),
            year: None,
            source: ProfileSource::Heuristic,
        }
    }

    /// Additive capability score. Unavailable signals contribute nothing.
    pub fn heuristic_score(&self, signals: &CapabilitySignals) -> u32 {
        let cores = match signals.cores.unwrap_or(0) {
            8.. => 3,
            6..=7 => 2,
            4..=5 => 1,
            _ => 0,
        };

        let memory = match signals.memory_gb {
            Some(gb) if gb >= 8.0 => 3,
            Some(gb) if gb >= 4.0 => 2,
            Some(gb) if gb >= 2.0 => 1,
            _ => 0,
        };

        let network = signals
            .network
            .as_ref()
            .filter(|class| {
                class
                    .as_str()
                    .eq_ignore_ascii_case(&self.config.fast_network_class)
            })
            .map_or(0, |_| 1);

        cores + memory + network + self.gpu_score(signals)
    }

    fn gpu_score(&self, signals: &CapabilitySignals) -> u32 {
        let renderer = match signals.gpu_renderer.as_deref() {
            Some(renderer) => {
                let matches = |patterns: &[Regex]| patterns.iter().any(|p| p.is_match(renderer));
                if matches(&self.gpu_top) {
                    4
                } else if matches(&self.gpu_high) {
                    3
                } else if matches(&self.gpu_mid) {
                    2
                } else {
                    1
                }
            }
            None => 0,
        };

        let texture = match signals.max_texture_size {
            Some(size) if size >= self.config.large_texture_size => 2,
            Some(size) if size >= self.config.medium_texture_size => 1,
            _ => 0,
        };

        renderer + texture
    }

    fn tier_for_score(&self, score: u32) -> DeviceTier {
        if score >= self.config.flagship_score {
            DeviceTier::Flagship
        } else if score >= self.config.high_score {
            DeviceTier::High
        } else if score >= self.config.mid_score {
            DeviceTier::Mid
        } else {
            DeviceTier::Low
        }
    }
}

/// Classify the device behind `signals`. Always returns a profile.
pub fn classify_device(signals: &CapabilitySignals, config: &ClassifierConfig) -> DeviceProfile {
    DeviceClassifier::new(config).classify(signals)
}

/// Concerns that make running the detection pipeline doubtful on this device
pub fn capability_check(
    profile: &DeviceProfile,
    signals: &CapabilitySignals,
) -> Vec<CapabilityConcern> {
    let mut concerns = Vec::new();

    if profile.tier == DeviceTier::Low && profile.ram_gb < 3 {
        concerns.push(CapabilityConcern::InsufficientMemory {
            ram_gb: profile.ram_gb,
        });
    }

    if signals.gpu_renderer.is_none() && profile.gpu.is_none() {
        concerns.push(CapabilityConcern::NoGpuRenderer);
    }

    if !concerns.is_empty() {
        debug!(count = concerns.len(), "Device capability concerns");
    }

    concerns
}

fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!("Skipping invalid GPU pattern '{}': {}", pattern, e);
                None
            }
        })
        .collect()
}

fn major_version(pattern: &Regex, ua: &str) -> Option<u32> {
    pattern
        .captures(ua)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn extract_android_model(ua: &str) -> Option<String> {
    let token = ANDROID_MODEL.captures(ua)?.get(1)?.as_str();
    let token = token.split(" Build/").next().unwrap_or(token).trim();

    if token.is_empty() || token.eq_ignore_ascii_case("wv") || token.eq_ignore_ascii_case("K") {
        None
    } else {
        Some(token.to_string())
    }
}
