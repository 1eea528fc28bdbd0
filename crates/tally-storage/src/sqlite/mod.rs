//! SQLite 저장소 어댑터.
//!
//! `RequestQueue` + `EventStore` + `PreferenceStore` 포트 구현.
//!
//! # 모듈 구조
//! - `requests`: 전송 대기 요청 FIFO 큐
//! - `events`: 집계 이벤트 단일 레코드
//! - `preferences`: 키-값 환경설정
//!
//! 모든 연산은 하나의 연결 뮤텍스로 직렬화된다. peek/dequeue, enqueue,
//! 집계 이벤트 교체가 서로 끼어들 수 없다.

mod events;
mod preferences;
mod requests;

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use tally_core::error::CoreError;
use tracing::info;

use crate::migration;

/// SQLite 저장소
pub struct SqliteStorage {
    pub(super) conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// 파일 기반 SQLite 저장소 생성
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| CoreError::Storage(format!("SQLite 열기 실패: {e}")))?;

        // 요청 하나를 잃지 않는 것이 처리량보다 중요하므로 synchronous=FULL
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            PRAGMA temp_store=MEMORY;
            ",
        )
        .map_err(|e| CoreError::Storage(format!("PRAGMA 설정 실패: {e}")))?;

        migration::run_migrations(&conn)
            .map_err(|e| CoreError::Storage(format!("마이그레이션 실패: {e}")))?;

        info!("SQLite 저장소 초기화: {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 인메모리 SQLite 저장소 생성 (테스트용)
    pub fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CoreError::Storage(format!("인메모리 SQLite 생성 실패: {e}")))?;

        migration::run_migrations(&conn)
            .map_err(|e| CoreError::Storage(format!("마이그레이션 실패: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}
