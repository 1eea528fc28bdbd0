//! 로컬 저장소 포트.
//!
//! 구현: `tally-storage` crate (rusqlite)

use crate::error::CoreError;
use crate::models::event::EventSet;
use crate::models::request::PendingRequest;

/// 전송 대기 요청 FIFO 큐
pub trait RequestQueue: Send + Sync {
    /// 큐 끝에 추가
    fn enqueue_request(&self, payload: &str) -> Result<(), CoreError>;

    /// 가장 오래된 요청 조회 (제거 안함)
    fn peek_next_request(&self) -> Result<Option<PendingRequest>, CoreError>;

    /// `peek_next_request`가 돌려준 요청을 ID로 제거
    fn dequeue_request(&self, id: i64) -> Result<(), CoreError>;

    fn is_request_queue_empty(&self) -> Result<bool, CoreError>;

    fn request_queue_len(&self) -> Result<usize, CoreError>;
}

/// 집계 이벤트 단일 레코드 저장소
pub trait EventStore: Send + Sync {
    /// 저장된 집계 이벤트 (없으면 빈 집합, 손상된 경우도 빈 집합)
    fn load_aggregated_events(&self) -> Result<EventSet, CoreError>;

    /// 통째로 교체
    fn save_aggregated_events(&self, events: &EventSet) -> Result<(), CoreError>;

    /// 통째로 삭제
    fn clear_aggregated_events(&self) -> Result<(), CoreError>;
}

/// 키-값 환경설정 저장소 (디바이스 ID, 디멘션, 푸시 토큰 캐시)
pub trait PreferenceStore: Send + Sync {
    fn get_preference(&self, key: &str) -> Result<Option<String>, CoreError>;

    fn set_preference(&self, key: &str, value: &str) -> Result<(), CoreError>;
}
