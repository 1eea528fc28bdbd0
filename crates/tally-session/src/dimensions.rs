//! 요청 공통 디멘션.
//!
//! 모든 요청에 `dimensions=`로 붙는 키-값 맵. 환경설정에 JSON 객체로 보관한다.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tally_core::error::CoreError;
use tally_core::ports::storage::PreferenceStore;
use tracing::warn;

/// 환경설정 키
pub const DIMENSIONS_KEY: &str = "dimensions";

/// 푸시 수신 가능 여부 디멘션
pub const PUSH_DIMENSION: &str = "push";

/// 영속 디멘션 맵
pub struct Dimensions {
    store: Arc<dyn PreferenceStore>,
    values: RwLock<BTreeMap<String, String>>,
}

impl Dimensions {
    /// 저장된 디멘션 로드. 손상된 값은 버리고 빈 맵으로 시작한다.
    pub fn load(store: Arc<dyn PreferenceStore>) -> Result<Self, CoreError> {
        let values = match store.get_preference(DIMENSIONS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("저장된 디멘션 파싱 실패, 초기화: {e}");
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };
        Ok(Self {
            store,
            values: RwLock::new(values),
        })
    }

    /// 추가 또는 덮어쓰기. 저장에 성공해야 반영된다.
    pub fn add(&self, key: &str, value: &str) -> Result<(), CoreError> {
        if key.is_empty() {
            return Err(CoreError::validation("dimension", "키가 비어 있음"));
        }

        let mut values = self.values.write();
        if values.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        self.store
            .set_preference(DIMENSIONS_KEY, &serde_json::to_string(&next)?)?;
        *values = next;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.read().clone()
    }
}
