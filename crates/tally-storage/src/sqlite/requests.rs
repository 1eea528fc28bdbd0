//! 전송 대기 요청 큐 (RequestQueue 포트 구현).

use rusqlite::OptionalExtension;
use tally_core::error::CoreError;
use tally_core::models::request::PendingRequest;
use tally_core::ports::storage::RequestQueue;
use tracing::debug;

use super::SqliteStorage;

impl RequestQueue for SqliteStorage {
    fn enqueue_request(&self, payload: &str) -> Result<(), CoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO requests (payload) VALUES (?1)",
            rusqlite::params![payload],
        )
        .map_err(|e| CoreError::Storage(format!("요청 저장 실패: {e}")))?;

        debug!("요청 큐 추가: id={}", conn.last_insert_rowid());
        Ok(())
    }

    fn peek_next_request(&self) -> Result<Option<PendingRequest>, CoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, payload FROM requests ORDER BY id ASC LIMIT 1",
            [],
            |row| {
                Ok(PendingRequest {
                    id: row.get(0)?,
                    payload: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(|e| CoreError::Storage(format!("요청 조회 실패: {e}")))
    }

    fn dequeue_request(&self, id: i64) -> Result<(), CoreError> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute("DELETE FROM requests WHERE id = ?1", rusqlite::params![id])
            .map_err(|e| CoreError::Storage(format!("요청 삭제 실패: {e}")))?;

        if deleted == 0 {
            debug!("이미 제거된 요청: id={id}");
        }
        Ok(())
    }

    fn is_request_queue_empty(&self) -> Result<bool, CoreError> {
        Ok(self.request_queue_len()? == 0)
    }

    fn request_queue_len(&self) -> Result<usize, CoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM requests", [], |row| row.get(0))
            .map_err(|e| CoreError::Storage(format!("요청 수 조회 실패: {e}")))?;
        Ok(count as usize)
    }
}
