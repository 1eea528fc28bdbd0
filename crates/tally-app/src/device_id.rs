//! 디바이스 ID 공급자.
//!
//! 환경설정에 저장된 ID를 쓰고, 없으면 UUID v4를 만들어 저장한다.

use std::sync::Arc;
use tally_core::error::CoreError;
use tally_core::ports::storage::PreferenceStore;
use tally_session::orchestrator::SessionOrchestrator;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

pub const DEVICE_ID_KEY: &str = "device_id";

/// 저장된 ID 로드 또는 생성
pub fn load_or_create(store: &dyn PreferenceStore) -> Result<String, CoreError> {
    if let Some(id) = store.get_preference(DEVICE_ID_KEY)? {
        if !id.is_empty() {
            return Ok(id);
        }
    }
    let id = Uuid::new_v4().to_string();
    store.set_preference(DEVICE_ID_KEY, &id)?;
    info!("새 디바이스 ID 생성");
    Ok(id)
}

/// 백그라운드에서 ID를 확정하고 오케스트레이터에 알린다
pub fn spawn_resolution(
    store: Arc<dyn PreferenceStore>,
    orchestrator: Arc<SessionOrchestrator>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let result =
            load_or_create(store.as_ref()).and_then(|id| orchestrator.on_device_id_resolved(&id));
        if let Err(e) = result {
            error!("디바이스 ID 확정 실패: {e}");
        }
    })
}
