//! 디바이스 식별자와 디바이스 메트릭.

use serde::Serialize;
use std::ops::Range;
use std::sync::OnceLock;

use crate::error::CoreError;
use crate::models::encode_query_value;

/// 식별자가 아직 준비되지 않았을 때 `device_id` 자리에 들어가는 토큰
pub const DEVICE_ID_PLACEHOLDER: &str = "REPLACE_UDID";

/// 페이로드 안에서 플레이스홀더가 차지하는 필드 전체
pub const PLACEHOLDER_FIELD: &str = "device_id=REPLACE_UDID";

/// 설치 단위 디바이스 식별자.
///
/// 비동기로 준비되며, 한 번 확정되면 프로세스 수명 동안 바뀌지 않는다.
#[derive(Debug, Default)]
pub struct DeviceIdentity {
    id: OnceLock<String>,
}

impl DeviceIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이미 확정된 식별자로 생성
    pub fn resolved(id: &str) -> Result<Self, CoreError> {
        let identity = Self::new();
        identity.resolve(id)?;
        Ok(identity)
    }

    /// 식별자 확정. 이미 확정된 경우 기존 값을 유지하고 `false` 반환.
    pub fn resolve(&self, id: &str) -> Result<bool, CoreError> {
        if id.is_empty() {
            return Err(CoreError::validation("device_id", "빈 식별자"));
        }
        if id == DEVICE_ID_PLACEHOLDER {
            return Err(CoreError::validation(
                "device_id",
                "플레이스홀더 토큰은 식별자로 쓸 수 없음",
            ));
        }
        Ok(self.id.set(id.to_string()).is_ok())
    }

    pub fn get(&self) -> Option<&str> {
        self.id.get().map(String::as_str)
    }

    pub fn is_resolved(&self) -> bool {
        self.id.get().is_some()
    }

    /// 페이로드에 넣을 `device_id` 값 (미확정이면 플레이스홀더)
    pub fn query_value(&self) -> String {
        match self.get() {
            Some(id) => encode_query_value(id),
            None => DEVICE_ID_PLACEHOLDER.to_string(),
        }
    }

    /// 전송 직전 페이로드 사본의 플레이스홀더 치환.
    ///
    /// 플레이스홀더가 없으면 그대로, 있는데 아직 미확정이면 `None`.
    pub fn substitute(&self, payload: &str) -> Option<String> {
        let Some(range) = placeholder_range(payload) else {
            return Some(payload.to_string());
        };
        let id = self.get()?;
        let mut sent = payload.to_string();
        sent.replace_range(range, &format!("device_id={}", encode_query_value(id)));
        Some(sent)
    }
}

/// 페이로드에 플레이스홀더 필드가 있는지 (필드 값 전체가 토큰과 같아야 함)
pub fn has_placeholder(payload: &str) -> bool {
    placeholder_range(payload).is_some()
}

/// `device_id=REPLACE_UDID`가 `&`로 구분된 필드 하나를 온전히 차지하는 위치.
/// `device_id=REPLACE_UDIDx` 같은 실제 값의 접두사는 일치로 보지 않는다.
fn placeholder_range(payload: &str) -> Option<Range<usize>> {
    let bytes = payload.as_bytes();
    payload
        .match_indices(PLACEHOLDER_FIELD)
        .map(|(start, _)| start..start + PLACEHOLDER_FIELD.len())
        .find(|r| {
            (r.start == 0 || bytes[r.start - 1] == b'&')
                && (r.end == bytes.len() || bytes[r.end] == b'&')
        })
}

/// 디바이스 메트릭 (`metrics=` 값의 원본)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceMetrics {
    #[serde(rename = "_device")]
    pub device: String,
    #[serde(rename = "_os")]
    pub os: String,
    #[serde(rename = "_os_version")]
    pub os_version: String,
    #[serde(rename = "_carrier")]
    pub carrier: String,
    #[serde(rename = "_resolution")]
    pub resolution: String,
    #[serde(rename = "_locale")]
    pub locale: String,
    #[serde(rename = "_app_version")]
    pub app_version: String,
}

impl DeviceMetrics {
    /// URL 인코딩된 JSON 객체
    pub fn to_query_value(&self) -> Result<String, CoreError> {
        let json = serde_json::to_string(self)?;
        Ok(encode_query_value(&json))
    }
}
