//! 수집 서버 포트.
//!
//! 구현: `tally-network` crate (reqwest)

use async_trait::async_trait;

use crate::error::CoreError;

/// 수집 서버로 페이로드 하나를 전송
#[async_trait]
pub trait Collector: Send + Sync {
    /// 쿼리 문자열 하나를 전송한다.
    ///
    /// 응답 본문까지 모두 읽었으면 성공. 전송 계층 실패만 에러다.
    async fn send(&self, query: &str) -> Result<(), CoreError>;
}
