//! 푸시 토큰 캐시.
//!
//! 토큰은 발급 당시의 앱 버전과 함께 저장한다. 앱이 업데이트되면
//! 캐시를 무시하고 다시 등록해야 한다.

use std::sync::Arc;
use tally_core::error::CoreError;
use tally_core::ports::storage::PreferenceStore;
use tracing::debug;

const TOKEN_KEY: &str = "push_token";
const TOKEN_APP_VERSION_KEY: &str = "push_token_app_version";

pub struct PushRegistry {
    store: Arc<dyn PreferenceStore>,
}

impl PushRegistry {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// 같은 앱 버전에서 받은 토큰만 반환
    pub fn cached_token(&self, app_version: &str) -> Result<Option<String>, CoreError> {
        let Some(token) = self.store.get_preference(TOKEN_KEY)? else {
            return Ok(None);
        };
        let stored_version = self.store.get_preference(TOKEN_APP_VERSION_KEY)?;
        if stored_version.as_deref() != Some(app_version) {
            debug!(
                "앱 버전 변경으로 푸시 토큰 재등록 필요: {:?} → {app_version}",
                stored_version
            );
            return Ok(None);
        }
        Ok(Some(token))
    }

    pub fn store_token(&self, token: &str, app_version: &str) -> Result<(), CoreError> {
        if token.is_empty() {
            return Err(CoreError::validation("token", "빈 푸시 토큰"));
        }
        self.store.set_preference(TOKEN_KEY, token)?;
        self.store.set_preference(TOKEN_APP_VERSION_KEY, app_version)
    }
}
