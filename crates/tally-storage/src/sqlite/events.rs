//! 집계 이벤트 단일 레코드 (EventStore 포트 구현).
//!
//! 이벤트마다 행을 만들지 않고 전체 집합을 JSON blob 하나로 교체한다.

use rusqlite::OptionalExtension;
use tally_core::error::CoreError;
use tally_core::models::event::EventSet;
use tally_core::ports::storage::EventStore;
use tracing::{debug, warn};

use super::SqliteStorage;

impl EventStore for SqliteStorage {
    fn load_aggregated_events(&self) -> Result<EventSet, CoreError> {
        let conn = self.conn.lock();
        let blob: Option<String> = conn
            .query_row(
                "SELECT events FROM aggregated_events WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CoreError::Storage(format!("집계 이벤트 조회 실패: {e}")))?;

        let Some(blob) = blob else {
            return Ok(EventSet::default());
        };

        match EventSet::from_blob(&blob) {
            Ok(set) => {
                debug!("집계 이벤트 로드: {}개", set.len());
                Ok(set)
            }
            Err(e) => {
                warn!("손상된 집계 이벤트 레코드 무시: {e}");
                Ok(EventSet::default())
            }
        }
    }

    fn save_aggregated_events(&self, events: &EventSet) -> Result<(), CoreError> {
        let blob = events.to_blob()?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO aggregated_events (id, events, updated_at)
             VALUES (1, ?1, datetime('now'))",
            rusqlite::params![blob],
        )
        .map_err(|e| CoreError::Storage(format!("집계 이벤트 저장 실패: {e}")))?;
        Ok(())
    }

    fn clear_aggregated_events(&self) -> Result<(), CoreError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM aggregated_events", [])
            .map_err(|e| CoreError::Storage(format!("집계 이벤트 삭제 실패: {e}")))?;
        Ok(())
    }
}
