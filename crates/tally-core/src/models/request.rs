//! 전송 요청 페이로드.
//!
//! 요청 종류는 닫힌 enum [`RequestKind`] 하나로 표현하고,
//! 직렬화 함수 [`RequestKind::to_query`] 하나가 쿼리 문자열을 만든다.

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::models::encode_query_value;

/// 요청 종류별 필드
#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    /// `begin_session=1`
    BeginSession {
        /// 인코딩이 끝난 디바이스 메트릭 문자열 (그대로 붙인다)
        metrics: String,
    },
    /// `session_duration=<초>`
    UpdateSession { duration_secs: u64 },
    /// `end_session=1&session_duration=<초>`
    EndSession { duration_secs: u64 },
    /// 푸시 토큰 등록
    TokenSession { token: String, locale: String },
    /// 이벤트 배치. 인코딩이 끝난 JSON 배열 문자열.
    Events { events: String },
}

impl RequestKind {
    /// 로그용 짧은 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::BeginSession { .. } => "begin_session",
            Self::UpdateSession { .. } => "update_session",
            Self::EndSession { .. } => "end_session",
            Self::TokenSession { .. } => "token_session",
            Self::Events { .. } => "events",
        }
    }

    /// 쿼리 문자열 생성
    pub fn to_query(&self, ctx: &RequestContext<'_>) -> Result<String, CoreError> {
        let mut fields: Vec<(&str, String)> = vec![
            ("app_key", encode_query_value(ctx.app_key)),
            ("device_id", ctx.device_id.to_string()),
            ("timestamp", ctx.timestamp.to_string()),
        ];

        match self {
            Self::BeginSession { metrics } => {
                fields.push(("sdk_version", encode_query_value(ctx.sdk_version)));
                fields.push(("begin_session", "1".to_string()));
                fields.push(("metrics", metrics.clone()));
            }
            Self::UpdateSession { duration_secs } => {
                fields.push(("session_duration", duration_secs.to_string()));
            }
            Self::EndSession { duration_secs } => {
                fields.push(("end_session", "1".to_string()));
                fields.push(("session_duration", duration_secs.to_string()));
            }
            Self::TokenSession { token, locale } => {
                fields.push(("token_session", "1".to_string()));
                fields.push(("android_token", encode_query_value(token)));
                fields.push(("locale", encode_query_value(locale)));
            }
            Self::Events { events } => {
                fields.push(("events", events.clone()));
            }
        }

        if !ctx.dimensions.is_empty() {
            let json = serde_json::to_string(ctx.dimensions)?;
            fields.push(("dimensions", encode_query_value(&json)));
        }

        Ok(fields
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&"))
    }
}

/// 모든 요청에 공통으로 들어가는 값
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    pub app_key: &'a str,
    /// 이미 쿼리 값 형태 (실제 식별자 또는 플레이스홀더)
    pub device_id: &'a str,
    pub timestamp: i64,
    pub sdk_version: &'a str,
    pub dimensions: &'a BTreeMap<String, String>,
}

/// 큐에 저장된 요청 하나. `id`는 저장소의 대리 키.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: i64,
    pub payload: String,
}
