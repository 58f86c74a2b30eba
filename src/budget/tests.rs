use super::*;
use crate::device::{DeviceProfile, DeviceTier};
use crate::host::{classify_host, HostEnvironmentInfo, HostLimitations, HostName, Platform};
use crate::storage::StorageTier;
use proptest::prelude::*;

const INSTAGRAM_IOS_UA: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Instagram 250.0.0.21.109 (iPhone13,2; iOS 16_0; en_US; en-US; scale=3.00; 1170x2532; 302553456)";
const INSTAGRAM_ANDROID_UA: &str =
    "Instagram 250.0.0.21.109 Android (30/11; 420dpi; 1080x2220; samsung; SM-G991B)";

fn profile(tier: DeviceTier) -> DeviceProfile {
    DeviceProfile::with_tier(tier)
}

fn standalone() -> HostEnvironmentInfo {
    HostEnvironmentInfo::standalone(Platform::Unknown)
}

fn degrade_hint() -> DegradeHint {
    DegradeHint {
        reason: DegradeReason::LowFrameRate,
        observed_fps: 7.5,
        mean_memory_mb: None,
    }
}

#[test]
fn test_flagship_standalone_gets_full_budget() {
    let budget = resolve_budget(&profile(DeviceTier::Flagship), &standalone(), None);

    assert_eq!(budget.tier, DeviceTier::Flagship);
    assert_eq!(budget.capture_resolution, Resolution::new(1280, 720));
    assert_eq!(budget.frame_rate_ceiling, 30);
    assert_eq!(budget.detection_backend, DetectionBackend::Gpu);
    assert!(budget.refine_landmarks);
    assert_eq!(budget.max_detected_faces, 1);
    assert_eq!(budget.detection_interval_ms, 125);
    assert_eq!(budget.memory_ceiling_mb, 500);
    assert_eq!(
        budget.storage_tier_preference,
        vec![StorageTier::Durable, StorageTier::Session, StorageTier::Memory]
    );
    assert!(budget.detection_enabled);
    assert!(!budget.compatibility_warning);
}

#[test]
fn test_base_table() {
    let high = base_budget(DeviceTier::High);
    assert_eq!(high.capture_resolution, Resolution::new(960, 540));
    assert_eq!(high.memory_ceiling_mb, 300);

    let mid = base_budget(DeviceTier::Mid);
    assert_eq!(mid.capture_resolution, Resolution::new(640, 480));
    assert_eq!(mid.frame_rate_ceiling, 24);
    assert!(!mid.refine_landmarks);

    let low = base_budget(DeviceTier::Low);
    assert_eq!(low.detection_backend, DetectionBackend::Cpu);
    assert_eq!(low.detection_interval_ms, 300);

    let unknown = base_budget(DeviceTier::Unknown);
    assert_eq!(unknown.memory_ceiling_mb, 150);
    assert_eq!(unknown.detection_interval_ms, 250);
}

#[test]
fn test_instagram_ios_mid_device() {
    let host = classify_host(INSTAGRAM_IOS_UA);
    let budget = resolve_budget(&profile(DeviceTier::Mid), &host, None);

    assert_eq!(budget.capture_resolution, Resolution::new(480, 360));
    assert_eq!(budget.frame_rate_ceiling, 15);
    assert_eq!(budget.detection_backend, DetectionBackend::Cpu);
    assert_eq!(budget.detection_interval_ms, 400);
    assert_eq!(budget.memory_ceiling_mb, 80);
    assert!(!budget.refine_landmarks);
    assert!(!budget.storage_tier_preference.contains(&StorageTier::Durable));
    assert!(!budget.structured_storage);
    assert!(budget.simplified_ui);
    assert!(budget.detection_enabled);
    assert!(budget.compatibility_warning);
    assert!(!budget.performance_warning);
}

#[test]
fn test_instagram_android_keeps_durable_storage() {
    let host = classify_host(INSTAGRAM_ANDROID_UA);
    let budget = resolve_budget(&profile(DeviceTier::Flagship), &host, None);

    assert_eq!(budget.memory_ceiling_mb, 100);
    assert_eq!(budget.storage_tier_preference[0], StorageTier::Durable);
}

#[test]
fn test_outdated_instagram_disables_detection() {
    let host = classify_host("Mozilla/5.0 (iPhone) Instagram 150.1.0");
    let budget = resolve_budget(&profile(DeviceTier::Flagship), &host, None);

    assert!(!budget.detection_enabled);
    assert!(budget.performance_warning);
}

#[test]
fn test_wechat_is_most_restrictive() {
    let host = classify_host("Mozilla/5.0 (Linux; Android 12) MicroMessenger/8.0.30");
    let budget = resolve_budget(&profile(DeviceTier::Flagship), &host, None);

    assert_eq!(budget.capture_resolution, Resolution::new(480, 360));
    assert_eq!(budget.detection_backend, DetectionBackend::Cpu);
    assert!(!budget.detection_enabled);
    assert!(budget.performance_warning);
    assert_eq!(
        budget.storage_tier_preference,
        vec![StorageTier::Session, StorageTier::Memory]
    );
}

#[test]
fn test_tiktok_ceiling() {
    let host = classify_host("Mozilla/5.0 (Linux; Android 13) TikTok 30.1.2");
    let budget = resolve_budget(&profile(DeviceTier::Flagship), &host, None);

    assert_eq!(budget.capture_resolution, Resolution::new(480, 360));
    assert_eq!(budget.detection_interval_ms, 500);
    assert_eq!(budget.memory_ceiling_mb, 80);
    assert_eq!(budget.detection_backend, DetectionBackend::Cpu);
    assert!(budget.simplified_ui);
}

#[test]
fn test_facebook_backend_depends_on_platform() {
    let android = classify_host("Mozilla/5.0 (Linux; Android 13) [FBAN/EMA;FBAV/400.0]");
    let budget = resolve_budget(&profile(DeviceTier::High), &android, None);
    assert_eq!(budget.capture_resolution, Resolution::new(640, 480));
    assert_eq!(budget.frame_rate_ceiling, 20);
    assert_eq!(budget.detection_backend, DetectionBackend::Gpu);
    assert_eq!(budget.memory_ceiling_mb, 120);
    assert_eq!(budget.detection_interval_ms, 300);
    assert!(budget.structured_storage);

    let ios = classify_host("Mozilla/5.0 (iPhone) [FBAN/FBIOS;FBAV/400.0]");
    let budget = resolve_budget(&profile(DeviceTier::High), &ios, None);
    assert_eq!(budget.detection_backend, DetectionBackend::Cpu);
    assert!(!budget.structured_storage);
}

#[test]
fn test_host_never_raises_low_tier() {
    let host = classify_host(INSTAGRAM_ANDROID_UA);
    let budget = resolve_budget(&profile(DeviceTier::Low), &host, None);

    assert_eq!(budget.capture_resolution, Resolution::new(480, 360));
    assert_eq!(budget.frame_rate_ceiling, 15);
    assert_eq!(budget.memory_ceiling_mb, 100);
    assert_eq!(budget.detection_interval_ms, 400);
}

#[test]
fn test_gpu_limitation_forces_cpu() {
    let host = HostEnvironmentInfo {
        is_embedded: true,
        host: Some(HostName::Unknown),
        platform: Platform::Android,
        version: None,
        device_hint: None,
        limitations: HostLimitations {
            gpu_backend: true,
            ..HostLimitations::default()
        },
    };
    let budget = resolve_budget(&profile(DeviceTier::High), &host, None);

    assert_eq!(budget.detection_backend, DetectionBackend::Cpu);
}

#[test]
fn test_degrade_steps_down_one_tier() {
    let hint = degrade_hint();

    let budget = resolve_budget(&profile(DeviceTier::Flagship), &standalone(), Some(&hint));
    assert_eq!(budget.tier, DeviceTier::High);
    assert_eq!(budget.capture_resolution, Resolution::new(960, 540));

    let budget = resolve_budget(&profile(DeviceTier::Low), &standalone(), Some(&hint));
    assert_eq!(budget.tier, DeviceTier::Low);
    assert_eq!(budget, base_budget(DeviceTier::Low));

    let budget = resolve_budget(&profile(DeviceTier::Unknown), &standalone(), Some(&hint));
    assert_eq!(budget.tier, DeviceTier::Low);
}

#[test]
fn test_degrade_still_applies_host_overlay() {
    let host = classify_host(INSTAGRAM_IOS_UA);
    let budget = resolve_budget(&profile(DeviceTier::Flagship), &host, Some(&degrade_hint()));

    assert_eq!(budget.tier, DeviceTier::High);
    assert_eq!(budget.capture_resolution, Resolution::new(480, 360));
    assert_eq!(budget.memory_ceiling_mb, 80);
}

#[test]
fn test_capture_constraints_per_platform() {
    let budget = base_budget(DeviceTier::Mid);

    let ios = HostEnvironmentInfo::standalone(Platform::Ios);
    let constraints = capture_constraints(&budget, &ios, FacingMode::User);
    assert_eq!(constraints.width, DimensionConstraint::Exact(640));
    assert_eq!(constraints.height, DimensionConstraint::Exact(480));
    assert_eq!(constraints.frame_rate_max, 24);
    assert_eq!(constraints.aspect_ratio_ideal, None);

    let android = HostEnvironmentInfo::standalone(Platform::Android);
    let constraints = capture_constraints(&budget, &android, FacingMode::Environment);
    assert_eq!(constraints.width, DimensionConstraint::Ideal(640));
    assert_eq!(constraints.facing_mode, FacingMode::Environment);
    assert!(constraints.aspect_ratio_ideal.is_some());

    let instagram = classify_host(INSTAGRAM_ANDROID_UA);
    let budget = resolve_budget(&profile(DeviceTier::Mid), &instagram, None);
    let constraints = capture_constraints(&budget, &instagram, FacingMode::User);
    assert_eq!(constraints.width.value(), 480);
    assert_eq!(constraints.aspect_ratio_ideal, None);
}

#[test]
fn test_constraints_serialize_like_media_track_constraints() {
    let budget = base_budget(DeviceTier::Low);
    let ios = HostEnvironmentInfo::standalone(Platform::Ios);
    let json = serde_json::to_value(capture_constraints(&budget, &ios, FacingMode::User)).unwrap();

    assert_eq!(json["width"]["exact"], 480);
    assert_eq!(json["facing_mode"], "user");
    assert!(json.get("aspect_ratio_ideal").is_none());
}

fn arb_tier() -> impl Strategy<Value = DeviceTier> {
    prop::sample::select(DeviceTier::ALL.to_vec())
}

fn arb_host() -> impl Strategy<Value = HostEnvironmentInfo> {
    let hosts = vec![
        HostName::Instagram,
        HostName::Facebook,
        HostName::Messenger,
        HostName::Twitter,
        HostName::LinkedIn,
        HostName::TikTok,
        HostName::KakaoTalk,
        HostName::Line,
        HostName::WeChat,
        HostName::Snapchat,
        HostName::Unknown,
    ];

    (
        any::<bool>(),
        proptest::option::of(prop::sample::select(hosts)),
        prop::sample::select(vec![Platform::Ios, Platform::Android, Platform::Unknown]),
        proptest::option::of("[0-9]{1,3}(\\.[0-9]{1,2}){0,3}"),
        prop::array::uniform6(any::<bool>()),
    )
        .prop_map(|(is_embedded, host, platform, version, flags)| HostEnvironmentInfo {
            is_embedded,
            host,
            platform,
            version,
            device_hint: None,
            limitations: HostLimitations {
                durable_storage: flags[0],
                structured_storage: flags[1],
                gpu_backend: flags[2],
                camera_access: flags[3],
                cookies: flags[4],
                throughput: flags[5],
            },
        })
}

proptest! {
    #[test]
    fn prop_host_overlay_is_ceiling_only(tier in arb_tier(), host in arb_host(), degraded in any::<bool>()) {
        let hint = degrade_hint();
        let budget = resolve_budget(&profile(tier), &host, degraded.then_some(&hint));
        let base = base_budget(budget.tier);

        prop_assert!(budget.within(&base));
        prop_assert_eq!(budget.max_detected_faces, 1);
        prop_assert!(!budget.storage_tier_preference.is_empty());
        for tier in &budget.storage_tier_preference {
            prop_assert!(base.storage_tier_preference.contains(tier));
        }
    }

    #[test]
    fn prop_degrade_never_raises(tier in arb_tier(), host in arb_host()) {
        let hint = degrade_hint();
        let normal = resolve_budget(&profile(tier), &host, None);
        let degraded = resolve_budget(&profile(tier), &host, Some(&hint));

        prop_assert!(degraded.within(&normal));
        prop_assert_eq!(degraded.tier, tier.next_lower());
    }
}
