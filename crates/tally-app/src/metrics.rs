//! 실행 환경에서 디바이스 메트릭 수집.

use sysinfo::System;
use tally_core::models::device::DeviceMetrics;

/// 현재 플랫폼의 디바이스 메트릭
pub fn detect_device_metrics() -> DeviceMetrics {
    DeviceMetrics {
        device: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        os: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
        os_version: System::os_version().unwrap_or_default(),
        carrier: String::new(),
        resolution: String::new(),
        locale: detect_locale(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// `LANG`에서 로케일 추출 (`ko_KR.UTF-8` → `ko_KR`)
pub fn detect_locale() -> String {
    std::env::var("LANG")
        .ok()
        .map(|lang| locale_from_lang(&lang))
        .filter(|l| !l.is_empty() && l != "C" && l != "POSIX")
        .unwrap_or_else(|| "en_US".to_string())
}

fn locale_from_lang(lang: &str) -> String {
    lang.split(['.', '@']).next().unwrap_or_default().to_string()
}
