//! 집계 이벤트 모델.
//!
//! 같은 병합 키로 기록된 이벤트는 하나의 [`Event`]로 누적된다.
//! 전송 전까지 메모리와 저장소에 [`EventSet`] 하나로 유지된다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::models::encode_query_value;

/// 이벤트 세그멘테이션 (키-값 태그). 값 동등성으로 비교한다.
pub type Segmentation = BTreeMap<String, String>;

/// 집계된 이벤트 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub key: String,
    pub count: u32,
    #[serde(default)]
    pub sum: f64,
    /// epoch 초
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<Segmentation>,
}

/// 병합 키.
///
/// 세그멘테이션 없이 기록하면 기존 항목의 세그멘테이션을 무시하고 키만 비교한다.
/// 세그멘테이션을 지정하면 세그멘테이션이 있고 값이 같은 항목만 일치한다.
/// 기존 SDK와의 호환 동작이므로 대칭으로 바꾸지 않는다.
#[derive(Debug, Clone, Copy)]
pub enum MergeKey<'a> {
    KeyOnly(&'a str),
    Segmented(&'a str, &'a Segmentation),
}

impl<'a> MergeKey<'a> {
    pub fn new(key: &'a str, segmentation: Option<&'a Segmentation>) -> Self {
        match segmentation {
            Some(seg) => Self::Segmented(key, seg),
            None => Self::KeyOnly(key),
        }
    }

    pub fn key(&self) -> &'a str {
        match self {
            Self::KeyOnly(key) | Self::Segmented(key, _) => key,
        }
    }
}

impl Event {
    /// 새 이벤트 생성 (첫 기록)
    pub fn new(
        key: &str,
        segmentation: Option<Segmentation>,
        count: u32,
        sum: f64,
        now: i64,
    ) -> Self {
        Self {
            key: key.to_string(),
            count,
            sum,
            timestamp: now,
            segmentation,
        }
    }

    /// 병합 키 일치 여부
    pub fn matches(&self, merge_key: &MergeKey<'_>) -> bool {
        match merge_key {
            MergeKey::KeyOnly(key) => self.key == *key,
            MergeKey::Segmented(key, seg) => {
                self.key == *key && self.segmentation.as_ref() == Some(*seg)
            }
        }
    }

    /// 기존 이벤트에 누적. 타임스탬프는 이전 값과 현재 시각의 평균(반올림).
    pub fn accumulate(&mut self, count: u32, sum: f64, now: i64) {
        self.count = self.count.saturating_add(count);
        self.sum += sum;
        self.timestamp = average_timestamp(self.timestamp, now);
    }
}

/// 두 epoch 초의 평균, 가장 가까운 정수로 반올림
pub fn average_timestamp(prior: i64, now: i64) -> i64 {
    ((prior as f64 + now as f64) / 2.0).round() as i64
}

/// 이벤트 기록 입력값 검증
pub fn validate_record(key: &str, count: u32) -> Result<(), CoreError> {
    if key.is_empty() {
        return Err(CoreError::validation("key", "이벤트 키가 비어 있음"));
    }
    if count == 0 {
        return Err(CoreError::validation("count", "count는 1 이상이어야 함"));
    }
    Ok(())
}

/// 아직 전송되지 않은 집계 이벤트 전체 (저장소에는 단일 레코드로 보관)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSet {
    #[serde(default)]
    pub events: Vec<Event>,
}

impl EventSet {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// 병합 키로 기존 이벤트에 누적하거나 새로 추가
    pub fn record(
        &mut self,
        key: &str,
        segmentation: Option<Segmentation>,
        count: u32,
        sum: f64,
        now: i64,
    ) {
        let merge_key = MergeKey::new(key, segmentation.as_ref());
        if let Some(existing) = self.events.iter_mut().find(|e| e.matches(&merge_key)) {
            existing.accumulate(count, sum, now);
            return;
        }
        self.events
            .push(Event::new(key, segmentation, count, sum, now));
    }

    /// 저장용 JSON blob (`{"events":[...]}`)
    pub fn to_blob(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// 저장된 blob 파싱
    pub fn from_blob(blob: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(blob)?)
    }

    /// 전송용 `events=` 값: URL 인코딩된 JSON 배열
    pub fn to_query_value(&self) -> Result<String, CoreError> {
        let json = serde_json::to_string(&self.events)?;
        Ok(encode_query_value(&json))
    }
}
