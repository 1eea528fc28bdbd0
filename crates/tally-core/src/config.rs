//! 에이전트 설정 구조체.
//!
//! 수집 서버, 세션/하트비트, 저장소 경로 설정을 정의한다.
//! [`crate::config_manager::ConfigManager`]가 JSON 파일에서 로드하고,
//! 바이너리가 CLI 인자로 덮어쓴다.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 에이전트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// 수집 서버 설정
    pub server: ServerConfig,
    /// 세션/이벤트 설정
    #[serde(default)]
    pub session: SessionConfig,
    /// 로컬 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
}

/// 수집 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 수집 서버 기본 URL (예: "https://collector.example.com")
    pub base_url: String,
    /// 앱 키
    #[serde(default)]
    pub app_key: String,
    /// 요청 타임아웃 (밀리초)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// 세션/이벤트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 세션 하트비트 주기 (초)
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// 이 개수 이상 쌓이면 즉시 이벤트 배치 전송
    #[serde(default = "default_event_flush_threshold")]
    pub event_flush_threshold: usize,
    /// begin_session에 실리는 SDK 버전
    #[serde(default = "default_sdk_version")]
    pub sdk_version: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            event_flush_threshold: default_event_flush_threshold(),
            sdk_version: default_sdk_version(),
        }
    }
}

/// 로컬 저장소 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite DB 파일 경로 (None이면 플랫폼 기본 경로)
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_secs() -> u64 {
    60
}

fn default_event_flush_threshold() -> usize {
    10
}

fn default_sdk_version() -> String {
    "2.0".to_string()
}

impl AgentConfig {
    /// 기본 설정
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://localhost:8000".to_string(),
                app_key: String::new(),
                request_timeout_ms: default_request_timeout_ms(),
            },
            session: SessionConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// 실행 전 필수값 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.server.base_url.trim().is_empty() {
            return Err(CoreError::Config("server.base_url이 비어 있음".to_string()));
        }
        if self.server.app_key.trim().is_empty() {
            return Err(CoreError::Config("server.app_key가 비어 있음".to_string()));
        }
        if self.session.heartbeat_interval_secs == 0 {
            return Err(CoreError::Config(
                "session.heartbeat_interval_secs는 0보다 커야 함".to_string(),
            ));
        }
        if self.session.event_flush_threshold == 0 {
            return Err(CoreError::Config(
                "session.event_flush_threshold는 0보다 커야 함".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.session.heartbeat_interval_secs)
    }
}
