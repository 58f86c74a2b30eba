//! Device identification tables. Adding a model is a data change here.

use super::profile::DeviceTier;
use crate::signals::ScreenGeometry;
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug)]
pub(crate) struct KnownModel {
    pub name: &'static str,
    pub tier: DeviceTier,
    pub ram_gb: u32,
    pub chipset: Option<&'static str>,
    pub year: Option<u16>,
}

const fn iphone(
    name: &'static str,
    ram_gb: u32,
    tier: DeviceTier,
    chipset: &'static str,
    year: u16,
) -> KnownModel {
    KnownModel {
        name,
        tier,
        ram_gb,
        chipset: Some(chipset),
        year: Some(year),
    }
}

use DeviceTier::{Flagship, High, Low, Mid};

pub(crate) static IPHONE_MODELS: &[KnownModel] = &[
    iphone("iPhone 6", 1, Low, "A8", 2014),
    iphone("iPhone 6 Plus", 1, Low, "A8", 2014),
    iphone("iPhone 6s", 2, Low, "A9", 2015),
    iphone("iPhone 6s Plus", 2, Low, "A9", 2015),
    iphone("iPhone SE", 2, Low, "A9", 2016),
    iphone("iPhone 7", 2, Mid, "A10", 2016),
    iphone("iPhone 7 Plus", 3, Mid, "A10", 2016),
    iphone("iPhone 8", 2, Mid, "A11", 2017),
    iphone("iPhone 8 Plus", 3, Mid, "A11", 2017),
    iphone("iPhone X", 3, High, "A11", 2017),
    iphone("iPhone XR", 3, High, "A12", 2018),
    iphone("iPhone XS", 4, High, "A12", 2018),
    iphone("iPhone XS Max", 4, High, "A12", 2018),
    iphone("iPhone 11", 4, High, "A13", 2019),
    iphone("iPhone 11 Pro", 4, Flagship, "A13", 2019),
    iphone("iPhone 11 Pro Max", 4, Flagship, "A13", 2019),
    iphone("iPhone SE (2nd generation)", 3, Mid, "A13", 2020),
    iphone("iPhone 12 mini", 4, High, "A14", 2020),
    iphone("iPhone 12", 4, High, "A14", 2020),
    iphone("iPhone 12 Pro", 6, Flagship, "A14", 2020),
    iphone("iPhone 12 Pro Max", 6, Flagship, "A14", 2020),
    iphone("iPhone 13 mini", 4, High, "A15", 2021),
    iphone("iPhone 13", 4, High, "A15", 2021),
    iphone("iPhone 13 Pro", 6, Flagship, "A15", 2021),
    iphone("iPhone 13 Pro Max", 6, Flagship, "A15", 2021),
    iphone("iPhone SE (3rd generation)", 4, Mid, "A15", 2022),
    iphone("iPhone 14", 6, Flagship, "A15", 2022),
    iphone("iPhone 14 Plus", 6, Flagship, "A15", 2022),
    iphone("iPhone 14 Pro", 6, Flagship, "A16", 2022),
    iphone("iPhone 14 Pro Max", 6, Flagship, "A16", 2022),
    iphone("iPhone 15", 6, Flagship, "A16", 2023),
    iphone("iPhone 15 Plus", 6, Flagship, "A16", 2023),
    iphone("iPhone 15 Pro", 8, Flagship, "A17 Pro", 2023),
    iphone("iPhone 15 Pro Max", 8, Flagship, "A17 Pro", 2023),
];

/// `iPhoneN,M` hardware identifiers as exposed in some user agents
pub(crate) static IPHONE_HARDWARE_IDS: &[(&str, &str)] = &[
    ("7,1", "iPhone 6 Plus"),
    ("7,2", "iPhone 6"),
    ("8,1", "iPhone 6s"),
    ("8,2", "iPhone 6s Plus"),
    ("8,4", "iPhone SE"),
    ("9,1", "iPhone 7"),
    ("9,2", "iPhone 7 Plus"),
    ("9,3", "iPhone 7"),
    ("9,4", "iPhone 7 Plus"),
    ("10,1", "iPhone 8"),
    ("10,2", "iPhone 8 Plus"),
    ("10,3", "iPhone X"),
    ("10,4", "iPhone 8"),
    ("10,5", "iPhone 8 Plus"),
    ("10,6", "iPhone X"),
    ("11,2", "iPhone XS"),
    ("11,4", "iPhone XS Max"),
    ("11,6", "iPhone XS Max"),
    ("11,8", "iPhone XR"),
    ("12,1", "iPhone 11"),
    ("12,3", "iPhone 11 Pro"),
    ("12,5", "iPhone 11 Pro Max"),
    ("12,8", "iPhone SE (2nd generation)"),
    ("13,1", "iPhone 12 mini"),
    ("13,2", "iPhone 12"),
    ("13,3", "iPhone 12 Pro"),
    ("13,4", "iPhone 12 Pro Max"),
    ("14,2", "iPhone 13 Pro"),
    ("14,3", "iPhone 13 Pro Max"),
    ("14,4", "iPhone 13 mini"),
    ("14,5", "iPhone 13"),
    ("14,6", "iPhone SE (3rd generation)"),
    ("14,7", "iPhone 14"),
    ("14,8", "iPhone 14 Plus"),
    ("15,2", "iPhone 14 Pro"),
    ("15,3", "iPhone 14 Pro Max"),
    ("15,4", "iPhone 15"),
    ("15,5", "iPhone 15 Plus"),
    ("16,1", "iPhone 15 Pro"),
    ("16,2", "iPhone 15 Pro Max"),
];

/// Screen-geometry fingerprint for platforms without a hardware identifier.
/// A `None` height matches any height. First match wins.
#[derive(Debug)]
pub(crate) struct ScreenFingerprint {
    pub pixel_ratio: f64,
    pub width: u32,
    pub height: Option<u32>,
    pub model: &'static str,
}

const fn screen(
    pixel_ratio: f64,
    width: u32,
    height: Option<u32>,
    model: &'static str,
) -> ScreenFingerprint {
    ScreenFingerprint {
        pixel_ratio,
        width,
        height,
        model,
    }
}

pub(crate) static SCREEN_FINGERPRINTS: &[ScreenFingerprint] = &[
    screen(3.0, 393, None, "iPhone 15 Pro Max"),
    screen(3.0, 430, None, "iPhone 15 Pro Max"),
    screen(3.0, 390, None, "iPhone 14 Pro"),
    screen(3.0, 428, None, "iPhone 14 Pro Max"),
    screen(3.0, 375, Some(812), "iPhone X"),
    screen(3.0, 414, Some(896), "iPhone XS Max"),
    screen(2.0, 375, Some(667), "iPhone 8"),
    screen(2.0, 414, Some(736), "iPhone 8 Plus"),
    screen(2.0, 390, None, "iPhone 14"),
    screen(2.0, 414, Some(896), "iPhone XR"),
    screen(2.0, 320, Some(568), "iPhone SE"),
];

/// Android model family patterns, ordered most specific first
#[derive(Debug)]
pub(crate) struct AndroidFamily {
    pub pattern: Regex,
    pub tier: DeviceTier,
    pub ram_gb: u32,
    pub chipset: Option<&'static str>,
}

static ANDROID_FAMILY_SPECS: &[(&str, DeviceTier, u32, Option<&str>)] = &[
    // Samsung Galaxy S
    (r"(?i)Galaxy S2[3-4]", Flagship, 12, Some("Snapdragon 8 Gen 2")),
    (r"(?i)Galaxy S2[1-2]", Flagship, 8, Some("Snapdragon 888")),
    (r"(?i)Galaxy S20", Flagship, 8, Some("Snapdragon 865")),
    (r"(?i)Galaxy S10", High, 8, Some("Snapdragon 855")),
    (r"(?i)Galaxy S9", High, 4, Some("Snapdragon 845")),
    (r"(?i)Galaxy S8", Mid, 4, Some("Snapdragon 835")),
    // Samsung Galaxy A
    (r"(?i)Galaxy A[5-7]\d", Mid, 6, None),
    (r"(?i)Galaxy A[3-4]\d", Mid, 4, None),
    (r"(?i)Galaxy A[0-2]\d", Low, 3, None),
    // Google Pixel
    (r"(?i)Pixel [7-9]", Flagship, 12, Some("Google Tensor")),
    (r"(?i)Pixel 6", Flagship, 8, Some("Google Tensor")),
    (r"(?i)Pixel [4-5]", High, 6, None),
    (r"(?i)Pixel 3", High, 4, None),
    (r"(?i)Pixel [1-2]", Mid, 4, None),
    // Xiaomi / Redmi / POCO
    (r"(?i)Mi 1[3-4]", Flagship, 12, None),
    (r"(?i)Mi 1[1-2]", Flagship, 8, None),
    (r"(?i)Redmi Note 1[1-3]", Mid, 6, None),
    (r"(?i)Redmi Note [8-9]", Mid, 4, None),
    (r"(?i)Redmi \d", Low, 3, None),
    (r"(?i)POCO [FX][3-5]", High, 8, None),
    // OnePlus
    (r"(?i)OnePlus 1[0-2]", Flagship, 12, None),
    (r"(?i)OnePlus [8-9]", Flagship, 8, None),
    (r"(?i)OnePlus [6-7]", High, 6, None),
    (r"(?i)OnePlus Nord", Mid, 6, None),
    // OPPO / Vivo / Realme
    (r"(?i)OPPO Find", Flagship, 8, None),
    (r"(?i)OPPO Reno", High, 6, None),
    (r"(?i)OPPO A\d", Mid, 4, None),
    (r"(?i)Vivo X\d", High, 8, None),
    (r"(?i)Vivo V\d", Mid, 6, None),
    (r"(?i)Vivo Y\d", Low, 4, None),
    (r"(?i)Realme \d", Mid, 4, None),
    (r"(?i)Realme GT", High, 8, None),
];

pub(crate) static ANDROID_FAMILIES: LazyLock<Vec<AndroidFamily>> = LazyLock::new(|| {
    ANDROID_FAMILY_SPECS
        .iter()
        .filter_map(|(pattern, tier, ram_gb, chipset)| {
            Regex::new(pattern).ok().map(|pattern| AndroidFamily {
                pattern,
                tier: *tier,
                ram_gb: *ram_gb,
                chipset: *chipset,
            })
        })
        .collect()
});

pub(crate) fn iphone_model(name: &str) -> Option<&'static KnownModel> {
    IPHONE_MODELS.iter().find(|model| model.name == name)
}

pub(crate) fn iphone_for_hardware_id(identifier: &str) -> Option<&'static str> {
    IPHONE_HARDWARE_IDS
        .iter()
        .find(|(id, _)| *id == identifier)
        .map(|(_, name)| *name)
}

pub(crate) fn iphone_for_screen(geometry: &ScreenGeometry) -> Option<&'static str> {
    SCREEN_FINGERPRINTS
        .iter()
        .find(|fp| {
            (fp.pixel_ratio - geometry.pixel_ratio).abs() < 0.01
                && fp.width == geometry.width
                && fp.height.map_or(true, |h| h == geometry.height)
        })
        .map(|fp| fp.model)
}

pub(crate) fn android_family(text: &str) -> Option<&'static AndroidFamily> {
    ANDROID_FAMILIES
        .iter()
        .find(|family| family.pattern.is_match(text))
}
