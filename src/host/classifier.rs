use super::types::{HostDeviceHint, HostEnvironmentInfo, HostLimitations, HostName, Platform};

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

/// One row of the host signature table
struct HostSignature {
    host: HostName,
    markers: &'static [&'static str],
    /// Markers that veto the row even when one of `markers` is present
    excludes: &'static [&'static str],
    version: Option<&'static str>,
    limitations: fn(Platform) -> HostLimitations,
}

/// Storage trouble on iOS web views, GPU unstable, camera and cookies isolated
fn ios_storage_limited(platform: Platform) -> HostLimitations {
    let ios = platform == Platform::Ios;
    HostLimitations {
        durable_storage: ios,
        structured_storage: ios,
        gpu_backend: false,
        camera_access: true,
        cookies: true,
        throughput: true,
    }
}

fn camera_and_cookies(_: Platform) -> HostLimitations {
    HostLimitations {
        camera_access: true,
        cookies: true,
        ..HostLimitations::default()
    }
}

fn ios_durable_only(platform: Platform) -> HostLimitations {
    HostLimitations {
        durable_storage: platform == Platform::Ios,
        camera_access: true,
        cookies: true,
        ..HostLimitations::default()
    }
}

fn all_storage_limited(_: Platform) -> HostLimitations {
    HostLimitations {
        durable_storage: true,
        structured_storage: true,
        gpu_backend: false,
        camera_access: true,
        cookies: true,
        throughput: true,
    }
}

/// Ordered; the first row with a matching marker wins
static SIGNATURES: &[HostSignature] = &[
    HostSignature {
        host: HostName::Instagram,
        markers: &["Instagram"],
        excludes: &[],
        version: Some(r"Instagram\s+([\d.]+)"),
        limitations: ios_storage_limited,
    },
    HostSignature {
        host: HostName::Facebook,
        markers: &["FBAN", "FBAV"],
        excludes: &[],
        version: Some(r"FBAV/([\d.]+)"),
        limitations: ios_storage_limited,
    },
    HostSignature {
        host: HostName::Messenger,
        markers: &["MessengerForiOS", "Messenger", "MESSENGER"],
        excludes: &["MicroMessenger"],
        version: None,
        limitations: ios_storage_limited,
    },
    HostSignature {
        host: HostName::Twitter,
        markers: &["Twitter"],
        excludes: &[],
        version: None,
        limitations: camera_and_cookies,
    },
    HostSignature {
        host: HostName::LinkedIn,
        markers: &["LinkedInApp"],
        excludes: &[],
        version: None,
        limitations: camera_and_cookies,
    },
    HostSignature {
        host: HostName::TikTok,
        markers: &["TikTok", "Musical.ly"],
        excludes: &[],
        version: None,
        limitations: ios_storage_limited,
    },
    HostSignature {
        host: HostName::KakaoTalk,
        markers: &["KAKAOTALK"],
        excludes: &[],
        version: None,
        limitations: ios_durable_only,
    },
    HostSignature {
        host: HostName::Line,
        markers: &["Line/"],
        excludes: &[],
        version: None,
        limitations: ios_durable_only,
    },
    HostSignature {
        host: HostName::WeChat,
        markers: &["MicroMessenger"],
        excludes: &[],
        version: None,
        limitations: all_storage_limited,
    },
    HostSignature {
        host: HostName::Snapchat,
        markers: &["Snapchat"],
        excludes: &[],
        version: None,
        limitations: ios_storage_limited,
    },
];

static VERSION_PATTERNS: LazyLock<Vec<Option<Regex>>> = LazyLock::new(|| {
    SIGNATURES
        .iter()
        .map(|sig| sig.version.and_then(|pattern| Regex::new(pattern).ok()))
        .collect()
});

static IOS_WEBVIEW_LIMITATIONS: HostLimitations = HostLimitations {
    durable_storage: true,
    structured_storage: true,
    gpu_backend: false,
    camera_access: true,
    cookies: true,
    throughput: false,
};

static ANDROID_WEBVIEW_LIMITATIONS: HostLimitations = HostLimitations {
    durable_storage: false,
    structured_storage: false,
    gpu_backend: true,
    camera_access: true,
    cookies: true,
    throughput: false,
};

static INSTAGRAM_IOS_MODEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((iPhone[\d,]+|iPad[\d,]+);").unwrap());
static INSTAGRAM_IOS_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"iOS\s+([\d_]+)").unwrap());
static INSTAGRAM_ANDROID_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Android\s+\((\d+)").unwrap());
static INSTAGRAM_ANDROID_MODEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";\s+([^;]+?)\s*\)").unwrap());
static SCREEN_RESOLUTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+x\d+)").unwrap());
static OS_MAJOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"OS (\d+)").unwrap());

/// Identify the embedding host from a user agent. Pure and total.
pub fn classify_host(user_agent: &str) -> HostEnvironmentInfo {
    let platform = Platform::from_user_agent(user_agent);

    let info = match SIGNATURES
        .iter()
        .position(|sig| {
            sig.markers.iter().any(|m| user_agent.contains(m))
                && !sig.excludes.iter().any(|m| user_agent.contains(m))
        })
    {
        Some(index) => {
            let signature = &SIGNATURES[index];
            let version = VERSION_PATTERNS
                .get(index)
                .and_then(Option::as_ref)
                .and_then(|pattern| pattern.captures(user_agent))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());
            let device_hint = (signature.host == HostName::Instagram)
                .then(|| parse_instagram_device(user_agent, platform));

            HostEnvironmentInfo {
                is_embedded: true,
                host: Some(signature.host),
                platform,
                version,
                device_hint,
                limitations: (signature.limitations)(platform),
            }
        }
        None => generic_webview(user_agent, platform),
    };

    info!(
        embedded = info.is_embedded,
        host = ?info.host,
        platform = ?info.platform,
        version = info.version.as_deref().unwrap_or("-"),
        "Host environment classified"
    );

    info
}

fn generic_webview(user_agent: &str, platform: Platform) -> HostEnvironmentInfo {
    let limitations = match platform {
        Platform::Ios if user_agent.contains("AppleWebKit") && !user_agent.contains("Safari") => {
            Some(IOS_WEBVIEW_LIMITATIONS)
        }
        Platform::Android if user_agent.contains("wv") => Some(ANDROID_WEBVIEW_LIMITATIONS),
        _ => None,
    };

    match limitations {
        Some(limitations) => {
            debug!(?platform, "Unidentified embedded web view");
            HostEnvironmentInfo {
                is_embedded: true,
                host: Some(HostName::Unknown),
                platform,
                version: None,
                device_hint: None,
                limitations,
            }
        }
        None => HostEnvironmentInfo::standalone(platform),
    }
}

fn parse_instagram_device(user_agent: &str, platform: Platform) -> HostDeviceHint {
    let capture = |pattern: &Regex| {
        pattern
            .captures(user_agent)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
    };

    let mut hint = HostDeviceHint::default();

    match platform {
        Platform::Ios => {
            hint.model = capture(&INSTAGRAM_IOS_MODEL);
            hint.os_version =
                capture(&INSTAGRAM_IOS_VERSION).map(|v| format!("iOS {}", v.replace('_', ".")));
            hint.screen_resolution = capture(&SCREEN_RESOLUTION);
        }
        Platform::Android => {
            hint.model = capture(&INSTAGRAM_ANDROID_MODEL);
            hint.os_version = capture(&INSTAGRAM_ANDROID_VERSION).map(|v| format!("Android {}", v));
            hint.screen_resolution = capture(&SCREEN_RESOLUTION);
        }
        Platform::Unknown => {}
    }

    hint
}

/// Whether camera permission needs the host-specific request flow
pub fn camera_permission_workaround(info: &HostEnvironmentInfo, user_agent: &str) -> bool {
    let affected = matches!(
        info.host,
        Some(HostName::Instagram | HostName::Facebook | HostName::Messenger)
    );
    if !affected {
        return false;
    }

    match info.platform {
        Platform::Ios => OS_MAJOR
            .captures(user_agent)
            .and_then(|caps| caps[1].parse::<u32>().ok())
            .is_some_and(|major| major >= 14),
        Platform::Android => true,
        Platform::Unknown => false,
    }
}

/// User-visible advisory for embedded hosts, `None` for regular browsers
pub fn advisory_message(info: &HostEnvironmentInfo) -> Option<String> {
    if !info.is_embedded {
        return None;
    }

    let host = info.host.unwrap_or(HostName::Unknown);
    match host {
        HostName::Instagram if info.platform == Platform::Ios => Some(
            "Using Instagram browser on iOS. For best experience, tap \"...\" menu and select \"Open in Safari\"."
                .to_string(),
        ),
        HostName::Instagram => Some(
            "Using Instagram browser. For best experience, tap \"...\" menu and select \"Open in Chrome\"."
                .to_string(),
        ),
        HostName::Facebook | HostName::Messenger => Some(format!(
            "Using {} browser. For better performance, open in your default browser.",
            host
        )),
        HostName::WeChat => Some(
            "WeChat browser detected. Some features may not work. Please open in Safari or Chrome."
                .to_string(),
        ),
        _ if info.limitations.throughput || info.limitations.gpu_backend => Some(format!(
            "Using {} browser. Performance may be limited. Consider opening in your default browser.",
            host
        )),
        _ => None,
    }
}
