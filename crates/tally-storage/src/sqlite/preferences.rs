//! 키-값 환경설정 (PreferenceStore 포트 구현).

use rusqlite::OptionalExtension;
use tally_core::error::CoreError;
use tally_core::ports::storage::PreferenceStore;

use super::SqliteStorage;

impl PreferenceStore for SqliteStorage {
    fn get_preference(&self, key: &str) -> Result<Option<String>, CoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM preferences WHERE key = ?1",
            rusqlite::params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| CoreError::Storage(format!("환경설정 조회 실패: {e}")))
    }

    fn set_preference(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO preferences (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )
        .map_err(|e| CoreError::Storage(format!("환경설정 저장 실패: {e}")))?;
        Ok(())
    }
}
