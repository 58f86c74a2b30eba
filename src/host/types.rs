use serde::{Deserialize, Serialize};
use std::fmt;

/// Embedding application recognized from the user agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostName {
    Instagram,
    Facebook,
    Messenger,
    Twitter,
    LinkedIn,
    TikTok,
    KakaoTalk,
    Line,
    WeChat,
    Snapchat,
    /// Embedded web view whose application could not be identified
    Unknown,
}

impl HostName {
    /// Human readable name used in advisory text
    pub fn display_name(self) -> &'static str {
        match self {
            HostName::Instagram => "Instagram",
            HostName::Facebook => "Facebook",
            HostName::Messenger => "Messenger",
            HostName::Twitter => "Twitter",
            HostName::LinkedIn => "LinkedIn",
            HostName::TikTok => "TikTok",
            HostName::KakaoTalk => "KakaoTalk",
            HostName::Line => "LINE",
            HostName::WeChat => "WeChat",
            HostName::Snapchat => "Snapchat",
            HostName::Unknown => "in-app",
        }
    }
}

impl fmt::Display for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    #[default]
    Unknown,
}

impl Platform {
    pub fn from_user_agent(ua: &str) -> Self {
        if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
            Platform::Ios
        } else if ua.contains("Android") {
            Platform::Android
        } else {
            Platform::Unknown
        }
    }
}

/// Features the host is known to break or degrade. `true` means limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostLimitations {
    pub durable_storage: bool,
    pub structured_storage: bool,
    pub gpu_backend: bool,
    pub camera_access: bool,
    pub cookies: bool,
    pub throughput: bool,
}

impl HostLimitations {
    pub fn any(&self) -> bool {
        self.durable_storage
            || self.structured_storage
            || self.gpu_backend
            || self.camera_access
            || self.cookies
            || self.throughput
    }
}

/// Device details some hosts put in their user agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDeviceHint {
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub screen_resolution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEnvironmentInfo {
    pub is_embedded: bool,
    pub host: Option<HostName>,
    pub platform: Platform,
    pub version: Option<String>,
    pub device_hint: Option<HostDeviceHint>,
    pub limitations: HostLimitations,
}

impl HostEnvironmentInfo {
    /// A regular, non-embedded browser
    pub fn standalone(platform: Platform) -> Self {
        Self {
            is_embedded: false,
            host: None,
            platform,
            version: None,
            device_hint: None,
            limitations: HostLimitations::default(),
        }
    }

    pub fn is_host(&self, host: HostName) -> bool {
        self.host == Some(host)
    }

    /// Leading numeric component of the host application version
    pub fn major_version(&self) -> Option<u32> {
        self.version
            .as_deref()
            .and_then(|v| v.split('.').next())
            .and_then(|major| major.parse().ok())
    }
}
