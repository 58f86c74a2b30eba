use config::{Config, ConfigError, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AdaptcamConfig {
    pub classifier: ClassifierConfig,
    pub detection: DetectionConfig,
    pub storage: StorageConfig,
    pub system: SystemConfig,
}

/// Heuristic scoring constants. These are hand-tuned and meant to be recalibrated.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifierConfig {
    /// Minimum total score for the flagship tier
    #[serde(default = "default_flagship_score")]
    pub flagship_score: u32,

    /// Minimum total score for the high tier
    #[serde(default = "default_high_score")]
    pub high_score: u32,

    /// Minimum total score for the mid tier
    #[serde(default = "default_mid_score")]
    pub mid_score: u32,

    /// Texture dimension that earns the full texture bonus
    #[serde(default = "default_large_texture_size")]
    pub large_texture_size: u32,

    /// Texture dimension that earns the partial texture bonus
    #[serde(default = "default_medium_texture_size")]
    pub medium_texture_size: u32,

    /// Renderer patterns scored 4 (case-insensitive regex)
    #[serde(default = "default_gpu_top_patterns")]
    pub gpu_top_patterns: Vec<String>,

    /// Renderer patterns scored 3
    #[serde(default = "default_gpu_high_patterns")]
    pub gpu_high_patterns: Vec<String>,

    /// Renderer patterns scored 2
    #[serde(default = "default_gpu_mid_patterns")]
    pub gpu_mid_patterns: Vec<String>,

    /// Network class that earns the network bonus
    #[serde(default = "default_fast_network_class")]
    pub fast_network_class: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectionConfig {
    /// Frame timestamps kept in the performance window
    #[serde(default = "default_window_frames")]
    pub window_frames: usize,

    /// Memory samples kept in the performance window
    #[serde(default = "default_memory_samples")]
    pub memory_samples: usize,

    /// Throughput below this is considered degraded
    #[serde(default = "default_min_fps")]
    pub min_fps: f64,

    /// Throughput below this earns an advisory suggestion
    #[serde(default = "default_target_fps")]
    pub target_fps: f64,

    /// Frames between performance evaluations
    #[serde(default = "default_evaluation_interval_frames")]
    pub evaluation_interval_frames: u32,

    /// Consecutive degraded evaluations before a degrade report fires
    #[serde(default = "default_sustained_checks")]
    pub sustained_checks: u32,

    /// Upper bound on a single detection call, in milliseconds
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,

    /// Reschedule delay while the video source has no usable frame
    #[serde(default = "default_not_ready_retry_ms")]
    pub not_ready_retry_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// File backing the durable tier
    #[serde(default = "default_durable_path")]
    pub durable_path: String,

    /// Key holding the replicated session identifier
    #[serde(default = "default_session_key")]
    pub session_key: String,

    /// Key holding the time the session identifier was written
    #[serde(default = "default_session_timestamp_key")]
    pub session_timestamp_key: String,

    /// Hours a stored session identifier stays valid
    #[serde(default = "default_session_validity_hours")]
    pub session_validity_hours: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Log every published runtime event at debug level
    #[serde(default = "default_debug_events")]
    pub debug_events: bool,
}

impl AdaptcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("adaptcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("classifier.flagship_score", default_flagship_score())?
            .set_default("classifier.high_score", default_high_score())?
            .set_default("classifier.mid_score", default_mid_score())?
            .set_default(
                "classifier.large_texture_size",
                default_large_texture_size(),
            )?
            .set_default(
                "classifier.medium_texture_size",
                default_medium_texture_size(),
            )?
            .set_default("classifier.gpu_top_patterns", default_gpu_top_patterns())?
            .set_default(
                "classifier.gpu_high_patterns",
                default_gpu_high_patterns(),
            )?
            .set_default("classifier.gpu_mid_patterns", default_gpu_mid_patterns())?
            .set_default(
                "classifier.fast_network_class",
                default_fast_network_class(),
            )?
            .set_default(
                "detection.window_frames",
                default_window_frames() as i64,
            )?
            .set_default(
                "detection.memory_samples",
                default_memory_samples() as i64,
            )?
            .set_default("detection.min_fps", default_min_fps())?
            .set_default("detection.target_fps", default_target_fps())?
            .set_default(
                "detection.evaluation_interval_frames",
                default_evaluation_interval_frames(),
            )?
            .set_default("detection.sustained_checks", default_sustained_checks())?
            .set_default("detection.frame_timeout_ms", default_frame_timeout_ms())?
            .set_default(
                "detection.not_ready_retry_ms",
                default_not_ready_retry_ms(),
            )?
            .set_default("storage.durable_path", default_durable_path())?
            .set_default("storage.session_key", default_session_key())?
            .set_default(
                "storage.session_timestamp_key",
                default_session_timestamp_key(),
            )?
            .set_default(
                "storage.session_validity_hours",
                default_session_validity_hours(),
            )?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.debug_events", default_debug_events())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with ADAPTCAM_ prefix
            .add_source(Environment::with_prefix("ADAPTCAM").separator("__"))
            .build()?;

        let config: AdaptcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let classifier = &self.classifier;
        if classifier.mid_score == 0
            || classifier.high_score <= classifier.mid_score
            || classifier.flagship_score <= classifier.high_score
        {
            return Err(ConfigError::Message(
                "Classifier scores must satisfy 0 < mid < high < flagship".to_string(),
            ));
        }

        if classifier.medium_texture_size > classifier.large_texture_size {
            return Err(ConfigError::Message(
                "Medium texture size must not exceed large texture size".to_string(),
            ));
        }

        for pattern in classifier
            .gpu_top_patterns
            .iter()
            .chain(&classifier.gpu_high_patterns)
            .chain(&classifier.gpu_mid_patterns)
        {
            if let Err(e) = Regex::new(pattern) {
                return Err(ConfigError::Message(format!(
                    "Invalid GPU pattern '{}': {}",
                    pattern, e
                )));
            }
        }

        let detection = &self.detection;
        if detection.window_frames < 2 {
            return Err(ConfigError::Message(
                "Detection window must hold at least 2 frames".to_string(),
            ));
        }

        if detection.memory_samples == 0 {
            return Err(ConfigError::Message(
                "Detection memory samples must be greater than 0".to_string(),
            ));
        }

        if detection.min_fps <= 0.0 || detection.target_fps < detection.min_fps {
            return Err(ConfigError::Message(
                "Detection fps thresholds must satisfy 0 < min_fps <= target_fps".to_string(),
            ));
        }

        if detection.evaluation_interval_frames == 0 || detection.sustained_checks == 0 {
            return Err(ConfigError::Message(
                "Detection evaluation interval and sustained checks must be greater than 0"
                    .to_string(),
            ));
        }

        if detection.frame_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Detection frame timeout must be greater than 0".to_string(),
            ));
        }

        if self.storage.session_key.is_empty() || self.storage.session_timestamp_key.is_empty() {
            return Err(ConfigError::Message(
                "Session storage keys must not be empty".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AdaptcamConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            detection: DetectionConfig::default(),
            storage: StorageConfig::default(),
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                debug_events: default_debug_events(),
            },
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            flagship_score: default_flagship_score(),
            high_score: default_high_score(),
            mid_score: default_mid_score(),
            large_texture_size: default_large_texture_size(),
            medium_texture_size: default_medium_texture_size(),
            gpu_top_patterns: default_gpu_top_patterns(),
            gpu_high_patterns: default_gpu_high_patterns(),
            gpu_mid_patterns: default_gpu_mid_patterns(),
            fast_network_class: default_fast_network_class(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_frames: default_window_frames(),
            memory_samples: default_memory_samples(),
            min_fps: default_min_fps(),
            target_fps: default_target_fps(),
            evaluation_interval_frames: default_evaluation_interval_frames(),
            sustained_checks: default_sustained_checks(),
            frame_timeout_ms: default_frame_timeout_ms(),
            not_ready_retry_ms: default_not_ready_retry_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            durable_path: default_durable_path(),
            session_key: default_session_key(),
            session_timestamp_key: default_session_timestamp_key(),
            session_validity_hours: default_session_validity_hours(),
        }
    }
}

// Default value functions
fn default_flagship_score() -> u32 {
    10
}
fn default_high_score() -> u32 {
    7
}
fn default_mid_score() -> u32 {
    4
}
fn default_large_texture_size() -> u32 {
    16384
}
fn default_medium_texture_size() -> u32 {
    8192
}
fn default_gpu_top_patterns() -> Vec<String> {
    vec!["(?i)Apple|M1|M2|A1[5-7]".to_string()]
}
fn default_gpu_high_patterns() -> Vec<String> {
    vec!["(?i)Adreno [67]\\d{2}|Mali-G[78]\\d".to_string()]
}
fn default_gpu_mid_patterns() -> Vec<String> {
    vec!["(?i)Adreno [5-6]\\d{2}|Mali-[GT]\\d{2}".to_string()]
}
fn default_fast_network_class() -> String {
    "4g".to_string()
}

fn default_window_frames() -> usize {
    60
}
fn default_memory_samples() -> usize {
    10
}
fn default_min_fps() -> f64 {
    10.0
}
fn default_target_fps() -> f64 {
    20.0
}
fn default_evaluation_interval_frames() -> u32 {
    30
}
fn default_sustained_checks() -> u32 {
    3
}
fn default_frame_timeout_ms() -> u64 {
    2000
}
fn default_not_ready_retry_ms() -> u64 {
    16
}

fn default_durable_path() -> String {
    "./adaptcam-storage.json".to_string()
}
fn default_session_key() -> String {
    "adaptcam_session_backup".to_string()
}
fn default_session_timestamp_key() -> String {
    "adaptcam_session_timestamp".to_string()
}
fn default_session_validity_hours() -> u32 {
    24
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_debug_events() -> bool {
    false
}
